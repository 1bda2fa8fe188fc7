use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quality::PhotoQuality;

/// Countdown lengths offered to the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub enum TimerSetting {
    Five,
    Ten,
}

impl TimerSetting {
    pub fn seconds(self) -> u8 {
        match self {
            TimerSetting::Five => 5,
            TimerSetting::Ten => 10,
        }
    }
}

impl Default for TimerSetting {
    fn default() -> Self {
        TimerSetting::Five
    }
}

impl TryFrom<u8> for TimerSetting {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(TimerSetting::Five),
            10 => Ok(TimerSetting::Ten),
            other => Err(format!("unsupported timer length {other}s (use 5 or 10)")),
        }
    }
}

impl From<TimerSetting> for u8 {
    fn from(value: TimerSetting) -> Self {
        value.seconds()
    }
}

impl fmt::Display for TimerSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.seconds())
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedPhoto {
    pub pose_name: String,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
    pub preview_data_uri: String,
    pub captured_at: DateTime<Utc>,
    pub timer_seconds_used: u8,
    pub quality: PhotoQuality,
}

impl CapturedPhoto {
    pub fn captured_at_epoch_ms(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }

    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.pose_name)
    }
}

impl fmt::Debug for CapturedPhoto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedPhoto")
            .field("pose_name", &self.pose_name)
            .field("jpeg_bytes", &self.jpeg.len())
            .field("captured_at", &self.captured_at)
            .field("timer_seconds_used", &self.timer_seconds_used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_setting_round_trips_as_seconds() {
        assert_eq!(serde_json::to_string(&TimerSetting::Ten).unwrap(), "10");
        let parsed: TimerSetting = serde_json::from_str("5").unwrap();
        assert_eq!(parsed, TimerSetting::Five);
        assert!(serde_json::from_str::<TimerSetting>("7").is_err());
    }
}
