//! Quota evaluation and window state.

mod engine;
mod window;

pub use engine::{Decision, QuotaEngine, QuotaError, WindowStatus};
pub use window::WindowRecord;
