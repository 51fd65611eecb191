#![no_main]

use libfuzzer_sys::fuzz_target;
use lectern_client::dispatch::dispatch;
use lectern_client::render::DEFAULT_STAGE_INTERVAL;
use lectern_client::{DisplayState, LecternMessage, RenderEngine};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding arbitrary text must never panic.
    let _ = LecternMessage::decode(frame);

    // Neither may rendering whatever decodes, including extreme scores.
    let mut engine = RenderEngine::new(DisplayState::default(), DEFAULT_STAGE_INTERVAL);
    let now = tokio::time::Instant::now();
    let _ = dispatch(frame, &mut engine, now);
    engine.on_light_tick(now + DEFAULT_STAGE_INTERVAL);
});
