use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CapturedPhoto, TimerSetting};

/// Timer usage derived from the photos currently held by the session.
/// Always recomputed from the live photo slots; never cached.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerUsageSummary {
    pub timers_used: Vec<u8>,
    pub average_timer: Option<f32>,
    pub timer_distribution: BTreeMap<String, u32>,
    pub timer_consistency: TimerConsistency,
    pub retake_count: u32,
    pub timer_cancellation_count: u32,
    pub total_session_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimerConsistency {
    None,
    Consistent,
    Mixed,
}

impl TimerConsistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerConsistency::None => "none",
            TimerConsistency::Consistent => "consistent",
            TimerConsistency::Mixed => "mixed",
        }
    }
}

pub fn timers_used<'a>(photos: impl IntoIterator<Item = &'a CapturedPhoto>) -> Vec<u8> {
    photos.into_iter().map(|p| p.timer_seconds_used).collect()
}

pub fn average_timer(timers: &[u8]) -> Option<f32> {
    if timers.is_empty() {
        return None;
    }
    let total: u32 = timers.iter().map(|&t| t as u32).sum();
    Some(total as f32 / timers.len() as f32)
}

/// Photo count per offered timer length, zero entries included.
pub fn timer_distribution(timers: &[u8]) -> BTreeMap<String, u32> {
    let mut distribution: BTreeMap<String, u32> = [TimerSetting::Five, TimerSetting::Ten]
        .iter()
        .map(|setting| (setting.to_string(), 0))
        .collect();
    for &seconds in timers {
        *distribution.entry(format!("{seconds}s")).or_insert(0) += 1;
    }
    distribution
}

pub fn timer_consistency(timers: &[u8]) -> TimerConsistency {
    match timers.first() {
        None => TimerConsistency::None,
        Some(first) if timers.iter().all(|t| t == first) => TimerConsistency::Consistent,
        Some(_) => TimerConsistency::Mixed,
    }
}

pub fn elapsed_ms(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_milliseconds().max(0)
}
