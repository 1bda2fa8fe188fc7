mod photo;

pub use photo::{CapturedPhoto, TimerSetting};
