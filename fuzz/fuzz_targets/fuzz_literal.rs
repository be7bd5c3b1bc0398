#![no_main]
use libfuzzer_sys::fuzz_target;
use odata_track::cli::{format_literal, LiteralForm};
use odata_track::serializer::literal::{format_duration, parse_duration};

const TYPES: &[&str] = &[
    "Edm.Int64",
    "Edm.Double",
    "Edm.Single",
    "Edm.Decimal",
    "Edm.Guid",
    "Edm.Date",
    "Edm.DateTimeOffset",
    "Edm.Duration",
    "Edm.Binary",
    "Collection(Edm.String)",
];

/// Fuzz literal parsing and formatting.
///
/// A duration that parses must format back to text that parses to the
/// same value.
fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(s) = std::str::from_utf8(rest) else {
        return;
    };

    if let Ok(duration) = parse_duration(s) {
        let text = format_duration(duration);
        assert_eq!(parse_duration(&text).ok(), Some(duration), "{s} -> {text}");
    }

    let type_name = TYPES[usize::from(selector) % TYPES.len()];
    let _ = format_literal(type_name, s, LiteralForm::Uri, false);
    let _ = format_literal(type_name, s, LiteralForm::Json, selector & 0x80 != 0);
});
