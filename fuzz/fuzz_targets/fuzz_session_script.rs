#![no_main]
use libfuzzer_sys::fuzz_target;
use odata_track::cli::{render_request, SessionScript};
use odata_track::ClientConfig;

/// Fuzz session scripts end to end: parse, replay and render.
///
/// Any script that replays must either build a request or fail with an
/// error; it must never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(script) = SessionScript::parse(s) {
            let _ = render_request(&script, ClientConfig::default(), None);
        }
    }
});
