use serde::Serialize;

/// One guided body orientation. The catalog order is the capture order.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    pub name: &'static str,
    pub instruction: &'static str,
    pub description: &'static str,
    pub guide_label: &'static str,
}

pub const POSE_COUNT: usize = 4;

pub const POSES: [Pose; POSE_COUNT] = [
    Pose {
        name: "front",
        instruction: "Face the camera",
        description: "Stand straight facing the camera with arms slightly away from your body.",
        guide_label: "Front view",
    },
    Pose {
        name: "left",
        instruction: "Turn to your left",
        description: "Turn 90 degrees so your left side faces the camera. Keep arms relaxed.",
        guide_label: "Left side",
    },
    Pose {
        name: "right",
        instruction: "Turn to your right",
        description: "Turn 90 degrees so your right side faces the camera. Keep arms relaxed.",
        guide_label: "Right side",
    },
    Pose {
        name: "back",
        instruction: "Face away from the camera",
        description: "Turn around so your back faces the camera, arms slightly away from your body.",
        guide_label: "Back view",
    },
];

pub const LAST_POSE_INDEX: usize = POSE_COUNT - 1;
