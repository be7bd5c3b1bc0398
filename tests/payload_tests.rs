//! Integration tests for update graphs and the request payloads built from them.

mod common;

use common::{car, context, context_with, person, RecordingTransport};
use odata_track::config::{AnnotationStyle, KeyDelimiter, PropertySendOption};
use odata_track::error::InvalidOperationKind;
use odata_track::graph::EdgeKind;
use odata_track::transport::HttpMethod;
use odata_track::{
    ClientConfig, DataServiceContext, EntityInstance, ODataError, ODataResponse, SaveMode,
};

const CONTEXT: &str = "http://localhost/odata/$metadata#People/$delta";

fn bulk_body(ctx: &DataServiceContext, roots: &[odata_track::InstanceId]) -> String {
    ctx.build_request(SaveMode::BulkUpdate, roots)
        .expect("bulk update request")
        .request
        .body_text()
}

fn delta(entries: &str) -> String {
    format!(r#"{{"@context":"{CONTEXT}","value":[{entries}]}}"#)
}

// ============================================================================
// Bulk update
// ============================================================================

#[test]
fn bulk_update_nests_added_children() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.attach(bing).expect("attach");
    ctx.update_object(bing).expect("update");
    ctx.add_related_object(bing, "Cars", a).expect("add car");

    let prepared = ctx.build_request(SaveMode::BulkUpdate, &[bing]).expect("request");
    assert_eq!(prepared.request.method, HttpMethod::Patch);
    assert_eq!(prepared.request.uri, "http://localhost/odata/People");
    assert_eq!(
        prepared.request.body_text(),
        delta(r#"{"ID":100,"Name":"Bing","Cars@delta":[{"ID":1001,"Name":"A"}]}"#)
    );

    let headers = &prepared.request.headers;
    assert_eq!(
        headers.get("Content-Type").map(String::as_str),
        Some("application/json;odata.metadata=minimal")
    );
    assert_eq!(headers.get("OData-Version").map(String::as_str), Some("4.01"));
    assert_eq!(headers.get("Prefer").map(String::as_str), Some("odata.continue-on-error"));
}

#[test]
fn unchanged_roots_write_keys_only() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.attach(bing).expect("attach");
    ctx.add_related_object(bing, "Cars", a).expect("add car");

    assert_eq!(
        bulk_body(&ctx, &[bing]),
        delta(r#"{"ID":100,"Cars@delta":[{"ID":1001,"Name":"A"}]}"#)
    );
}

#[test]
fn shared_entities_are_written_once() {
    let mut ctx = context();
    let p1 = person(&mut ctx, 1, "P1");
    let p2 = person(&mut ctx, 2, "P2");
    let c = car(&mut ctx, 10, "C");
    for p in [p1, p2] {
        ctx.attach(p).expect("attach");
        ctx.update_object(p).expect("update");
    }
    ctx.add_object("Cars", c).expect("add car");
    ctx.add_link(p1, "Cars", c).expect("link p1");
    ctx.add_link(p2, "Cars", c).expect("link p2");

    assert_eq!(
        bulk_body(&ctx, &[p1, p2]),
        delta(concat!(
            r#"{"ID":1,"Name":"P1","Cars@delta":[{"ID":10,"Name":"C"}]},"#,
            r#"{"ID":2,"Name":"P2","Cars@delta":[{"@id":"http://localhost/odata/Cars(10)"}]}"#
        ))
    );
}

#[test]
fn roots_sharing_an_existing_entity_each_reference_it() {
    let mut ctx = context();
    let p1 = person(&mut ctx, 1, "P1");
    let p2 = person(&mut ctx, 2, "P2");
    let c = car(&mut ctx, 1001, "C");
    for id in [p1, p2, c] {
        ctx.attach(id).expect("attach");
    }
    ctx.add_link(p1, "Cars", c).expect("link p1");
    ctx.add_link(p2, "Cars", c).expect("link p2");

    assert_eq!(
        bulk_body(&ctx, &[p1, p2]),
        delta(concat!(
            r#"{"ID":1,"Cars@delta":[{"@id":"http://localhost/odata/Cars(1001)"}]},"#,
            r#"{"ID":2,"Cars@delta":[{"@id":"http://localhost/odata/Cars(1001)"}]}"#
        ))
    );
}

#[test]
fn cycles_end_in_a_reference() {
    let mut ctx = context();
    let p1 = person(&mut ctx, 1, "P1");
    let p2 = person(&mut ctx, 2, "P2");
    for p in [p1, p2] {
        ctx.attach(p).expect("attach");
        ctx.update_object(p).expect("update");
    }
    ctx.set_link(p1, "Spouse", Some(p2)).expect("link");
    ctx.set_link(p2, "Spouse", Some(p1)).expect("link back");

    assert_eq!(
        bulk_body(&ctx, &[p1]),
        delta(
            r#"{"ID":1,"Name":"P1","Spouse":{"ID":2,"Name":"P2","Spouse":{"@id":"http://localhost/odata/People(1)"}}}"#
        )
    );
}

#[test]
fn links_to_unchanged_entities_are_references() {
    let mut ctx = context();
    let p1 = person(&mut ctx, 1, "P1");
    let p2 = person(&mut ctx, 2, "P2");
    ctx.attach(p1).expect("attach");
    ctx.attach(p2).expect("attach");
    ctx.set_link(p1, "Spouse", Some(p2)).expect("link");

    assert_eq!(
        bulk_body(&ctx, &[p1]),
        delta(r#"{"ID":1,"Spouse":{"@id":"http://localhost/odata/People(2)"}}"#)
    );

    ctx.set_link(p1, "Spouse", None).expect("clear");
    assert_eq!(bulk_body(&ctx, &[p1]), delta(r#"{"ID":1,"Spouse":null}"#));
}

#[test]
fn removed_links_and_deleted_entities() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    let kept = car(&mut ctx, 10, "Kept");
    let scrapped = car(&mut ctx, 11, "Scrapped");
    ctx.attach(p).expect("attach");
    ctx.attach(kept).expect("attach");
    ctx.attach(scrapped).expect("attach");
    ctx.attach_link(p, "Cars", kept).expect("link");
    ctx.attach_link(p, "Cars", scrapped).expect("link");

    ctx.delete_link(p, "Cars", kept).expect("unlink");
    ctx.delete_object(scrapped).expect("delete");

    // links are walked in change order: deleting the first one re-stamped it
    assert_eq!(
        bulk_body(&ctx, &[p]),
        delta(concat!(
            r#"{"ID":1,"Cars@delta":["#,
            r#"{"@removed":{"reason":"deleted"},"@id":"http://localhost/odata/Cars(11)"},"#,
            r#"{"@removed":{"reason":"changed"},"@id":"http://localhost/odata/Cars(10)"}"#,
            r#"]}"#
        ))
    );
}

#[test]
fn deleted_roots_are_removed_entries() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    ctx.attach(p).expect("attach");
    ctx.delete_object(p).expect("delete");
    assert_eq!(
        bulk_body(&ctx, &[p]),
        delta(r#"{"@removed":{"reason":"deleted"},"@id":"http://localhost/odata/People(1)"}"#)
    );
}

#[test]
fn roots_from_other_sets_carry_their_context() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    let c = car(&mut ctx, 10, "C");
    for e in [p, c] {
        ctx.attach(e).expect("attach");
        ctx.update_object(e).expect("update");
    }
    assert_eq!(
        bulk_body(&ctx, &[p, c]),
        delta(r##"{"ID":1,"Name":"P"},{"@context":"#Cars/$entity","ID":10,"Name":"C"}"##)
    );
}

#[test]
fn derived_types_carry_a_type_annotation() {
    let mut ctx = context();
    let e = ctx.create_instance(
        EntityInstance::new("NS.Employee")
            .with("ID", 5)
            .with("Name", "E")
            .with("Salary", 100),
    );
    ctx.attach(e).expect("attach");
    ctx.set_property(e, "Salary", 200).expect("raise");

    assert_eq!(
        bulk_body(&ctx, &[e]),
        delta(r##"{"@type":"#NS.Employee","ID":5,"Name":"E","Salary":200}"##)
    );
}

#[test]
fn only_set_properties_keeps_keys_and_changes() {
    let config = ClientConfig::builder()
        .send_option(PropertySendOption::OnlySetProperties)
        .build();
    let mut ctx = context_with(config);
    let e = ctx.create_instance(
        EntityInstance::new("NS.Employee")
            .with("ID", 5)
            .with("Name", "E")
            .with("Salary", 100),
    );
    ctx.attach(e).expect("attach");
    ctx.set_property(e, "Salary", 200).expect("raise");

    assert_eq!(
        bulk_body(&ctx, &[e]),
        delta(r##"{"@type":"#NS.Employee","ID":5,"Salary":200}"##)
    );
}

#[test]
fn prefixed_annotations_and_slash_keys() {
    let config = ClientConfig::builder()
        .annotation_style(AnnotationStyle::Prefixed)
        .key_delimiter(KeyDelimiter::Slash)
        .build();
    let mut ctx = context_with(config);
    let p = person(&mut ctx, 1, "P");
    ctx.attach(p).expect("attach");
    ctx.delete_object(p).expect("delete");

    let prepared = ctx.build_request(SaveMode::BulkUpdate, &[p]).expect("request");
    assert_eq!(
        prepared.request.body_text(),
        format!(
            r#"{{"@odata.context":"{CONTEXT}","value":[{{"@odata.removed":{{"reason":"deleted"}},"@odata.id":"http://localhost/odata/People/1"}}]}}"#
        )
    );
    assert_eq!(
        prepared.request.headers.get("OData-Version").map(String::as_str),
        Some("4.0")
    );
}

#[test]
fn request_headers_follow_the_config() {
    let config = ClientConfig::builder()
        .ieee754_compatible(true)
        .continue_on_error(false)
        .build();
    let mut ctx = context_with(config);
    let p = person(&mut ctx, 1, "P");
    ctx.attach(p).expect("attach");
    ctx.update_object(p).expect("update");

    let request = ctx.build_request(SaveMode::BulkUpdate, &[p]).expect("request").request;
    assert_eq!(
        request.headers.get("Content-Type").map(String::as_str),
        Some("application/json;odata.metadata=minimal;IEEE754Compatible=true")
    );
    assert_eq!(request.headers.get("Accept"), request.headers.get("Content-Type"));
    assert!(request.headers.get("Prefer").is_none());
}

#[test]
fn pretty_output_is_the_same_document() {
    let build = |pretty: bool| {
        let mut ctx = context_with(ClientConfig::builder().pretty(pretty).build());
        let bing = person(&mut ctx, 100, "Bing");
        let a = car(&mut ctx, 1001, "A");
        ctx.attach(bing).expect("attach");
        ctx.update_object(bing).expect("update");
        ctx.add_related_object(bing, "Cars", a).expect("add car");
        bulk_body(&ctx, &[bing])
    };
    let compact = build(false);
    let pretty = build(true);
    assert!(pretty.contains("\n  \"value\": ["));

    let parsed: serde_json::Value = serde_json::from_str(&compact).expect("valid JSON");
    assert_eq!(pretty, serde_json::to_string_pretty(&parsed).expect("pretty"));
}

// ============================================================================
// Deep insert
// ============================================================================

#[test]
fn deep_insert_writes_a_single_entity() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.add_object("People", bing).expect("add");
    ctx.add_related_object(bing, "Cars", a).expect("add car");

    let prepared = ctx.build_request(SaveMode::DeepInsert, &[bing]).expect("request");
    assert_eq!(prepared.request.method, HttpMethod::Post);
    assert_eq!(prepared.request.uri, "http://localhost/odata/People");
    assert_eq!(
        prepared.request.body_text(),
        r#"{"ID":100,"Name":"Bing","Cars":[{"ID":1001,"Name":"A"}]}"#
    );
}

#[test]
fn deep_insert_binds_existing_entities_by_reference() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let spouse = person(&mut ctx, 7, "Existing");
    ctx.attach(spouse).expect("attach");
    ctx.add_object("People", bing).expect("add");
    ctx.set_link(bing, "Spouse", Some(spouse)).expect("link");

    let prepared = ctx.build_request(SaveMode::DeepInsert, &[bing]).expect("request");
    assert_eq!(
        prepared.request.body_text(),
        r#"{"ID":100,"Name":"Bing","Spouse":{"@id":"http://localhost/odata/People(7)"}}"#
    );
}

#[test]
fn deep_insert_rejects_modified_related_entities() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.add_object("People", bing).expect("add");
    ctx.attach(a).expect("attach");
    ctx.update_object(a).expect("update");
    ctx.add_link(bing, "Cars", a).expect("link");

    let err = ctx.build_request(SaveMode::DeepInsert, &[bing]).unwrap_err();
    assert_eq!(
        err.invalid_operation_kind(),
        Some(&InvalidOperationKind::DeepInsertDeletedOrModified)
    );
}

fn assert_deep_insert_refused(ctx: &mut DataServiceContext, root: odata_track::InstanceId) {
    let transport = RecordingTransport::new(ODataResponse::no_content());
    let err = ctx.deep_insert(&transport, root).unwrap_err();
    assert_eq!(
        err.invalid_operation_kind(),
        Some(&InvalidOperationKind::DeepInsertDeletedOrModified)
    );
    assert!(transport.requests.borrow().is_empty());
}

#[test]
fn deep_insert_rejects_deleted_links() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.add_object("People", bing).expect("add");
    ctx.attach(a).expect("attach");
    ctx.attach_link(bing, "Cars", a).expect("link");
    ctx.delete_link(bing, "Cars", a).expect("unlink");

    assert_deep_insert_refused(&mut ctx, bing);
}

#[test]
fn deep_insert_rejects_deleted_related_entities() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.add_object("People", bing).expect("add");
    ctx.attach(a).expect("attach");
    ctx.add_link(bing, "Cars", a).expect("link");
    ctx.delete_object(a).expect("delete");

    assert_deep_insert_refused(&mut ctx, bing);
}

#[test]
fn deep_insert_needs_one_added_root() {
    let mut ctx = context();
    let p1 = person(&mut ctx, 1, "P1");
    let p2 = person(&mut ctx, 2, "P2");
    ctx.add_object("People", p1).expect("add");
    ctx.attach(p2).expect("attach");

    let err = ctx.build_graph(SaveMode::DeepInsert, &[p1, p2], false).unwrap_err();
    assert_eq!(
        err.invalid_operation_kind(),
        Some(&InvalidOperationKind::OnlyOneTopLevelEntity)
    );
    let err = ctx.build_graph(SaveMode::DeepInsert, &[p2], false).unwrap_err();
    assert_eq!(
        err.invalid_operation_kind(),
        Some(&InvalidOperationKind::DeepInsertRootNotAdded)
    );
}

// ============================================================================
// Graph construction
// ============================================================================

#[test]
fn roots_must_be_given_and_tracked() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    let err = ctx.build_graph(SaveMode::BulkUpdate, &[], false).unwrap_err();
    assert!(matches!(err, ODataError::ArgumentNull(ref name) if name == "roots"), "{err}");

    let err = ctx.build_graph(SaveMode::BulkUpdate, &[p], false).unwrap_err();
    assert_eq!(err.invalid_operation_kind(), Some(&InvalidOperationKind::EntityNotContained));
}

#[test]
fn graph_exposes_related_descriptors() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    let b = car(&mut ctx, 1002, "B");
    ctx.attach(bing).expect("attach");
    ctx.add_related_object(bing, "Cars", a).expect("add a");
    ctx.add_related_object(bing, "Cars", b).expect("add b");

    let graph = ctx.build_graph(SaveMode::BulkUpdate, &[bing], false).expect("graph");
    let root = ctx.get_descriptor(bing).map(|d| d.id()).expect("root descriptor");
    let children: Vec<_> = [a, b]
        .iter()
        .filter_map(|&c| ctx.get_descriptor(c).map(|d| d.id()))
        .collect();

    assert_eq!(graph.top_level_descriptors(), [root].as_slice());
    assert_eq!(graph.entity_set_name(), Some("People"));
    assert_eq!(graph.get_related_descriptors(root), children);
    assert!(graph
        .related(root)
        .iter()
        .all(|edge| edge.kind == EdgeKind::NestedEntity && edge.navigation == "Cars"));
}

#[test]
fn validate_only_runs_the_same_checks() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    let c = car(&mut ctx, 10, "C");
    ctx.attach(p).expect("attach");
    ctx.add_related_object(p, "Cars", c).expect("add car");

    let checked = ctx.build_graph(SaveMode::BulkUpdate, &[p], true).expect("graph");
    let built = ctx.build_graph(SaveMode::BulkUpdate, &[p], false).expect("graph");
    assert_eq!(checked, built);
    assert_eq!(checked.node_count(), 2);

    // validation still rejects what a real build would
    let err = ctx.build_graph(SaveMode::DeepInsert, &[p], true).unwrap_err();
    assert_eq!(
        err.invalid_operation_kind(),
        Some(&InvalidOperationKind::DeepInsertRootNotAdded)
    );
}
