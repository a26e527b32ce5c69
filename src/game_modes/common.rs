// Helpers shared by the screens that run a frame loop

use std::time::Instant;

use crate::FRAME_DURATION;

/// Sleep off whatever is left of this frame. Call at the end of each loop iteration.
pub fn limit_frame_rate(frame_start: Instant) {
    let elapsed = frame_start.elapsed();
    if elapsed < FRAME_DURATION {
        std::thread::sleep(FRAME_DURATION - elapsed);
    }
}
