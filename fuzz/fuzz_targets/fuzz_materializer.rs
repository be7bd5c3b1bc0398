#![no_main]
use libfuzzer_sys::fuzz_target;
use odata_track::config::AnnotationStyle;
use odata_track::model::{EdmPrimitiveType, EntityTypeDef, PropertyType};
use odata_track::{EdmModel, Materializer, ODataResponse, PayloadKind};

/// Fuzz query response materialization with arbitrary bodies.
fuzz_target!(|data: &[u8]| {
    let model = EdmModel::new()
        .with_entity_type(
            "NS.Person",
            EntityTypeDef::new()
                .key("ID", PropertyType::Primitive(EdmPrimitiveType::Int64))
                .property("Name", PropertyType::Primitive(EdmPrimitiveType::String))
                .property("Born", PropertyType::Primitive(EdmPrimitiveType::DateTimeOffset)),
        )
        .with_entity_set("People", "NS.Person");
    let materializer = Materializer::new(&model, AnnotationStyle::Short);
    let response = ODataResponse::new(200, data.to_vec());

    for kind in [PayloadKind::Feed, PayloadKind::Entity, PayloadKind::Property] {
        let _ = materializer.materialize(&response, kind, Some("NS.Person"));
    }
});
