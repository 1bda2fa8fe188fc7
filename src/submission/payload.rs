//! Request bodies for the analysis server. Field names are the server's
//! (snake_case), unlike the camelCase payloads sent to the webview.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    capture::TimerUsageSummary,
    models::CapturedPhoto,
    quality::{self, PoseChange},
};

use super::form::{Gender, Measurements};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BasicRequest {
    pub height: f32,
    pub weight: f32,
    pub gender: Gender,
}

impl From<&Measurements> for BasicRequest {
    fn from(m: &Measurements) -> Self {
        Self {
            height: m.height,
            weight: m.weight,
            gender: m.gender,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSettingsMeta {
    pub timers_used: Vec<u8>,
    pub average_timer: Option<f32>,
    pub timer_consistency: String,
    pub timer_distribution: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoseQualityMeta {
    pub brightness: f32,
    pub contrast: f32,
    pub sharpness: f32,
    pub exposure: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QualityHeuristics {
    pub per_pose: BTreeMap<String, PoseQualityMeta>,
    pub pose_changes: Vec<PoseChange>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionExperience {
    pub retake_count: u32,
    pub timer_cancellations: u32,
    pub total_session_ms: i64,
}

/// The `photo_metadata` part of an enhanced submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhotoMetadata {
    pub session_id: String,
    pub capture_timestamps: BTreeMap<String, i64>,
    pub poses: Vec<String>,
    pub timer_settings: TimerSettingsMeta,
    pub quality_heuristics: QualityHeuristics,
    pub session_experience: SessionExperience,
}

impl PhotoMetadata {
    /// `photos` must be in pose order.
    pub fn build(session_id: &str, photos: &[CapturedPhoto], summary: &TimerUsageSummary) -> Self {
        let capture_timestamps = photos
            .iter()
            .map(|p| (p.pose_name.clone(), p.captured_at_epoch_ms()))
            .collect();

        let per_pose = photos
            .iter()
            .map(|p| {
                (
                    p.pose_name.clone(),
                    PoseQualityMeta {
                        brightness: p.quality.brightness,
                        contrast: p.quality.contrast,
                        sharpness: p.quality.sharpness,
                        exposure: p.quality.exposure_label().to_string(),
                        width: p.quality.width,
                        height: p.quality.height,
                    },
                )
            })
            .collect();

        let pose_changes =
            quality::pose_changes(photos.iter().map(|p| (p.pose_name.as_str(), &p.quality)));

        Self {
            session_id: session_id.to_string(),
            capture_timestamps,
            poses: photos.iter().map(|p| p.pose_name.clone()).collect(),
            timer_settings: TimerSettingsMeta {
                timers_used: summary.timers_used.clone(),
                average_timer: summary.average_timer,
                timer_consistency: summary.timer_consistency.as_str().to_string(),
                timer_distribution: summary.timer_distribution.clone(),
            },
            quality_heuristics: QualityHeuristics {
                per_pose,
                pose_changes,
            },
            session_experience: SessionExperience {
                retake_count: summary.retake_count,
                timer_cancellations: summary.timer_cancellation_count,
                total_session_ms: summary.total_session_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{analytics, state::tests::photo};

    #[test]
    fn metadata_carries_timer_and_session_fields() {
        let photos = vec![
            photo("front", 5),
            photo("left", 5),
            photo("right", 10),
            photo("back", 10),
        ];
        let timers = analytics::timers_used(&photos);
        let summary = TimerUsageSummary {
            average_timer: analytics::average_timer(&timers),
            timer_distribution: analytics::timer_distribution(&timers),
            timer_consistency: analytics::timer_consistency(&timers),
            timers_used: timers,
            retake_count: 2,
            timer_cancellation_count: 1,
            total_session_ms: 42_000,
        };

        let meta = PhotoMetadata::build("session-1", &photos, &summary);
        let json = serde_json::to_value(&meta).unwrap();

        assert_eq!(json["session_id"], "session-1");
        assert_eq!(json["poses"], serde_json::json!(["front", "left", "right", "back"]));
        assert_eq!(json["timer_settings"]["timers_used"], serde_json::json!([5, 5, 10, 10]));
        assert_eq!(json["timer_settings"]["average_timer"], 7.5);
        assert_eq!(json["timer_settings"]["timer_consistency"], "mixed");
        assert_eq!(json["timer_settings"]["timer_distribution"]["10s"], 2);
        assert_eq!(json["session_experience"]["timer_cancellations"], 1);
        assert_eq!(json["session_experience"]["retake_count"], 2);
        assert_eq!(json["quality_heuristics"]["pose_changes"].as_array().unwrap().len(), 3);
        assert!(json["capture_timestamps"]["back"].is_i64());
    }

    #[test]
    fn basic_request_uses_lowercase_gender() {
        let body = BasicRequest {
            height: 180.0,
            weight: 80.0,
            gender: Gender::Male,
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json, serde_json::json!({"height": 180.0, "weight": 80.0, "gender": "male"}));
    }
}
