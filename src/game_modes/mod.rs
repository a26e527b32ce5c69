mod common;
mod online;

pub use common::limit_frame_rate;
pub use online::run_online;
