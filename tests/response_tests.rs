//! Integration tests for the save pipeline: transport exchange and response correlation.

mod common;

use common::{car, context, person, RecordingTransport};
use odata_track::response::Materialized;
use odata_track::transport::HttpMethod;
use odata_track::{
    DataServiceContext, DescriptorId, EntityState, InstanceId, ODataError, ODataResponse,
    ODataValue, PayloadKind, SaveMode, SaveState, TransportError,
};

fn descriptor_id(ctx: &DataServiceContext, instance: InstanceId) -> DescriptorId {
    ctx.get_descriptor(instance)
        .map(|d| d.id())
        .expect("entity should be tracked")
}

fn state_of(ctx: &DataServiceContext, instance: InstanceId) -> Option<EntityState> {
    ctx.get_descriptor(instance).map(|d| d.state())
}

/// Two attached people, both updated.
fn two_updates() -> (DataServiceContext, InstanceId, InstanceId) {
    let mut ctx = context();
    let p1 = person(&mut ctx, 1, "P1");
    let p2 = person(&mut ctx, 2, "P2");
    for p in [p1, p2] {
        ctx.attach(p).expect("attach");
        ctx.update_object(p).expect("update");
    }
    (ctx, p1, p2)
}

// ============================================================================
// Successful saves
// ============================================================================

#[test]
fn successful_bulk_update_settles_every_descriptor() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.attach(bing).expect("attach");
    ctx.update_object(bing).expect("update");
    ctx.add_related_object(bing, "Cars", a).expect("add car");

    let transport = RecordingTransport::new(ODataResponse::new(
        200,
        r#"{"value":[{"ID":100,"Name":"Bing","Cars@delta":[{"ID":1001,"Name":"A (saved)","@etag":"W/\"2\""}]}]}"#,
    ));
    let expected_body = ctx
        .build_request(SaveMode::BulkUpdate, &[bing])
        .expect("request")
        .request
        .body_text();

    let response = ctx.bulk_update(&transport, &[bing]).expect("save");
    assert_eq!(response.state, SaveState::Success);
    assert_eq!(response.iter().count(), 2);
    assert!(response.failures().is_empty());

    // the transport saw exactly the prepared request
    assert_eq!(transport.requests.borrow().len(), 1);
    assert_eq!(transport.last_body(), expected_body);

    assert!(ctx.modified_descriptors().is_empty());
    assert_eq!(state_of(&ctx, a), Some(EntityState::Unchanged));
    let car_entity = ctx.get_descriptor(a).and_then(|d| d.as_entity()).expect("car");
    assert_eq!(car_entity.identity(), Some("Cars(1001)"));
    assert_eq!(car_entity.etag(), Some("W/\"2\""));
    assert_eq!(
        ctx.instance(a).and_then(|e| e.get("Name")),
        Some(&ODataValue::from("A (saved)"))
    );
    let link = ctx.get_link_descriptor(bing, "Cars", Some(a)).expect("link");
    assert_eq!(link.state(), EntityState::Unchanged);

    // the merged values became the new snapshot
    ctx.set_property(a, "Name", "A (saved)").expect("same value");
    assert_eq!(state_of(&ctx, a), Some(EntityState::Unchanged));
}

#[test]
fn no_content_acknowledges_everything() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.add_object("People", bing).expect("add");
    ctx.add_related_object(bing, "Cars", a).expect("add car");

    let transport = RecordingTransport::new(ODataResponse::no_content());
    let response = ctx.deep_insert(&transport, bing).expect("save");
    assert_eq!(response.state, SaveState::Success);

    let request = transport.requests.borrow()[0].clone();
    assert_eq!(request.method, HttpMethod::Post);
    assert!(ctx.modified_descriptors().is_empty());
    assert!(ctx.tracker().descriptor_by_identity("People(100)").is_some());
    assert!(ctx.tracker().descriptor_by_identity("Cars(1001)").is_some());
}

#[test]
fn deep_insert_response_values_are_merged() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    let a = car(&mut ctx, 1001, "A");
    ctx.add_object("People", bing).expect("add");
    ctx.add_related_object(bing, "Cars", a).expect("add car");

    let transport = RecordingTransport::new(ODataResponse::new(
        201,
        r#"{"@etag":"W/\"1\"","ID":100,"Name":"Bing","Cars":[{"ID":1001,"Name":"A","Plate":"X-1"}]}"#,
    ));
    ctx.deep_insert(&transport, bing).expect("save");

    let person_entity = ctx.get_descriptor(bing).and_then(|d| d.as_entity()).expect("person");
    assert_eq!(person_entity.etag(), Some("W/\"1\""));
    assert_eq!(
        ctx.instance(a).and_then(|e| e.get("Plate")),
        Some(&ODataValue::from("X-1"))
    );
}

#[test]
fn deleted_entities_are_detached_after_saving() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    ctx.attach(p).expect("attach");
    ctx.delete_object(p).expect("delete");

    let transport = RecordingTransport::new(ODataResponse::new(
        200,
        r#"{"value":[{"@removed":{"reason":"deleted"},"@id":"http://localhost/odata/People(1)"}]}"#,
    ));
    ctx.bulk_update(&transport, &[p]).expect("save");
    assert!(ctx.get_descriptor(p).is_none());
    assert!(ctx.tracker().is_empty());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn partial_failure_isolates_the_failed_operation() {
    let (mut ctx, p1, p2) = two_updates();
    let transport = RecordingTransport::new(ODataResponse::new(
        200,
        r#"{"value":[
            {"ID":1,"Name":"P1"},
            {"@Core.DataModificationException":{"info":{"code":"Conflict","message":"busy"},"responseCode":409}}
        ]}"#,
    ));

    let err = ctx.bulk_update(&transport, &[p1, p2]).unwrap_err();
    let request = err.as_request_error().expect("request error");
    assert_eq!(request.message, "one or more operations failed");
    let inner = request.inner.as_ref().expect("inner error");
    assert_eq!(inner.status_code, 409);
    assert_eq!(inner.code.as_deref(), Some("Conflict"));
    assert_eq!(inner.message, "busy");

    assert_eq!(request.response.state, SaveState::PartialFailure);
    let first = request.response.find(descriptor_id(&ctx, p1)).expect("p1 outcome");
    assert!(first.is_success());
    let second = request.response.find(descriptor_id(&ctx, p2)).expect("p2 outcome");
    assert_eq!(second.status_code, 409);

    assert_eq!(state_of(&ctx, p1), Some(EntityState::Unchanged));
    assert_eq!(state_of(&ctx, p2), Some(EntityState::Modified));
}

#[test]
fn nested_failure_leaves_only_that_child_pending() {
    let mut ctx = context();
    let p = person(&mut ctx, 1, "P");
    let a = car(&mut ctx, 10, "A");
    let b = car(&mut ctx, 11, "B");
    ctx.add_object("People", p).expect("add");
    ctx.add_related_object(p, "Cars", a).expect("add a");
    ctx.add_related_object(p, "Cars", b).expect("add b");

    let transport = RecordingTransport::new(ODataResponse::new(
        201,
        r#"{"ID":1,"Name":"P","Cars":[
            {"ID":10,"Name":"A"},
            {"@Core.DataModificationException":{"info":{"message":"nope"}}}
        ]}"#,
    ));
    let err = ctx.deep_insert(&transport, p).unwrap_err();
    let request = err.as_request_error().expect("request error");
    assert_eq!(request.response.state, SaveState::PartialFailure);
    let inner = request.inner.as_ref().expect("inner error");
    assert_eq!(inner.status_code, 400);
    assert_eq!(inner.message, "nope");

    let failed = request.response.find(descriptor_id(&ctx, b)).expect("b outcome");
    assert!(!failed.is_success());
    let root = request.response.find(descriptor_id(&ctx, p)).expect("root outcome");
    assert!(root.is_success());
    assert_eq!(root.nested.len(), 2);

    assert_eq!(state_of(&ctx, p), Some(EntityState::Unchanged));
    assert_eq!(state_of(&ctx, a), Some(EntityState::Unchanged));
    assert_eq!(state_of(&ctx, b), Some(EntityState::Added));
    let link_state = |target| ctx.get_link_descriptor(p, "Cars", Some(target)).map(|d| d.state());
    assert_eq!(link_state(a), Some(EntityState::Unchanged));
    assert_eq!(link_state(b), Some(EntityState::Added));
}

#[test]
fn missing_entries_count_as_failures() {
    let (mut ctx, p1, _) = two_updates();
    let transport = RecordingTransport::new(ODataResponse::new(200, r#"{"value":[]}"#));
    let err = ctx.bulk_update(&transport, &[p1]).unwrap_err();
    let request = err.as_request_error().expect("request error");
    assert_eq!(request.response.state, SaveState::Failure);
    assert_eq!(state_of(&ctx, p1), Some(EntityState::Modified));
}

#[test]
fn invalid_responses_change_nothing() {
    for body in [r#"{"value":[{"ID":null,"Name":"P1"}]}"#, "not json"] {
        let (mut ctx, p1, _) = two_updates();
        let before: Vec<_> = ctx.modified_descriptors().iter().map(|d| (d.id(), d.change_order())).collect();

        let transport = RecordingTransport::new(ODataResponse::new(200, body));
        let err = ctx.bulk_update(&transport, &[p1]).unwrap_err();
        let request = err.as_request_error().expect("request error");
        assert_eq!(request.response.state, SaveState::Failure);
        assert!(request.response.is_empty(), "{body}");

        let after: Vec<_> = ctx.modified_descriptors().iter().map(|d| (d.id(), d.change_order())).collect();
        assert_eq!(before, after, "{body}");
    }
}

#[test]
fn server_errors_carry_the_error_body() {
    let (mut ctx, p1, _) = two_updates();
    let transport = RecordingTransport::new(ODataResponse::new(
        500,
        r#"{"error":{"code":"Boom","message":"it broke"}}"#,
    ));
    let err = ctx.bulk_update(&transport, &[p1]).unwrap_err();
    let request = err.as_request_error().expect("request error");
    let inner = request.inner.as_ref().expect("inner error");
    assert_eq!(inner.status_code, 500);
    assert_eq!(inner.code.as_deref(), Some("Boom"));
    assert_eq!(inner.message, "it broke");
    assert_eq!(request.response.state, SaveState::Failure);
    assert_eq!(state_of(&ctx, p1), Some(EntityState::Modified));
}

#[test]
fn transport_errors_are_propagated_unchanged() {
    let (mut ctx, p1, _) = two_updates();
    let transport = RecordingTransport::failing(TransportError::Timeout);
    let err = ctx.bulk_update(&transport, &[p1]).unwrap_err();
    assert!(matches!(err, ODataError::Transport(TransportError::Timeout)), "{err}");
    assert_eq!(state_of(&ctx, p1), Some(EntityState::Modified));
}

#[test]
fn request_errors_are_raised_before_sending() {
    let mut ctx = context();
    let transport = RecordingTransport::new(ODataResponse::no_content());
    assert!(matches!(
        ctx.bulk_update(&transport, &[]),
        Err(ODataError::ArgumentNull(_))
    ));
    assert!(transport.requests.borrow().is_empty());
}

// ============================================================================
// Async and queries
// ============================================================================

#[test]
fn async_save_matches_the_blocking_one() {
    let (mut ctx, p1, p2) = two_updates();
    let transport = RecordingTransport::new(ODataResponse::no_content());
    let response = futures::executor::block_on(ctx.bulk_update_async(&transport, &[p1, p2]))
        .expect("save");
    assert_eq!(response.state, SaveState::Success);
    assert_eq!(response.operations.len(), 2);
    assert!(ctx.modified_descriptors().is_empty());
}

#[test]
fn async_deep_insert() {
    let mut ctx = context();
    let bing = person(&mut ctx, 100, "Bing");
    ctx.add_object("People", bing).expect("add");
    let transport = RecordingTransport::new(ODataResponse::new(201, r#"{"ID":100,"Name":"Bing"}"#));
    futures::executor::block_on(ctx.deep_insert_async(&transport, bing)).expect("save");
    assert_eq!(state_of(&ctx, bing), Some(EntityState::Unchanged));
}

#[test]
fn execute_materializes_a_feed() {
    let ctx = context();
    let transport = RecordingTransport::new(ODataResponse::new(
        200,
        r##"{"value":[{"@type":"#NS.Employee","ID":5,"Name":"E","Salary":10},{"ID":1,"Name":"P"}],"@nextLink":"People?$skip=2","@count":7}"##,
    ));

    let result = ctx
        .execute(&transport, "People", PayloadKind::Feed, Some("NS.Person"))
        .expect("query");
    let request = transport.requests.borrow()[0].clone();
    assert_eq!(request.method, HttpMethod::Get);
    assert_eq!(request.uri, "http://localhost/odata/People");

    let types: Vec<&str> = result
        .iter()
        .filter_map(Materialized::as_entity)
        .map(|e| e.type_name())
        .collect();
    assert_eq!(types, ["NS.Employee", "NS.Person"]);
    assert_eq!(result.next_link(), Some("People?$skip=2"));
    assert_eq!(result.total_count(), Some(7));
}

#[test]
fn failed_queries_are_request_errors() {
    let ctx = context();
    let transport = RecordingTransport::new(ODataResponse::new(404, "no such set"));
    let err = ctx
        .execute(&transport, "Planets", PayloadKind::Feed, None)
        .unwrap_err();
    let inner = err
        .as_request_error()
        .and_then(|r| r.inner.as_ref())
        .expect("inner error");
    assert_eq!(inner.status_code, 404);
    assert_eq!(inner.message, "no such set");
}
