pub mod analytics;
pub mod commands;
pub mod controller;
pub mod events;
pub mod frame;
pub mod state;

pub use analytics::TimerUsageSummary;
pub use controller::CaptureController;
pub use events::SessionEvent;
pub use state::{CaptureStatus, SessionSnapshot};
