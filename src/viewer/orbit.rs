use std::f32::consts::{FRAC_PI_4, PI, TAU};

use serde::{Deserialize, Serialize};

pub const MAX_PITCH: f32 = FRAC_PI_4;
pub const MIN_DISTANCE: f32 = 1.5;
pub const MAX_DISTANCE: f32 = 6.0;
pub const DEFAULT_DISTANCE: f32 = 3.0;

const ROTATE_SPEED: f32 = 0.008;
const ZOOM_SPEED: f32 = 0.001;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
}

/// Raw input forwarded from the viewer canvas.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ViewerInput {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    #[serde(rename_all = "camelCase")]
    Wheel { delta_y: f32 },
    TouchStart { touches: Vec<TouchPoint> },
    TouchMove { touches: Vec<TouchPoint> },
    TouchEnd,
    ResetView,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CameraPose {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
}

/// Orbit camera around the mannequin. Yaw is free, pitch and distance are
/// clamped.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pub target: [f32; 3],
    drag_from: Option<(f32, f32)>,
    pinch_span: Option<f32>,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: DEFAULT_DISTANCE,
            target: [0.0; 3],
            drag_from: None,
            pinch_span: None,
        }
    }
}

impl OrbitControls {
    /// Apply one input event. Returns true when the view changed.
    pub fn apply(&mut self, input: &ViewerInput) -> bool {
        match input {
            ViewerInput::PointerDown { x, y } => {
                self.drag_from = Some((*x, *y));
                false
            }
            ViewerInput::PointerMove { x, y } => self.drag_to(*x, *y),
            ViewerInput::PointerUp | ViewerInput::TouchEnd => {
                self.drag_from = None;
                self.pinch_span = None;
                false
            }
            ViewerInput::Wheel { delta_y } => self.zoom_by(1.0 + delta_y * ZOOM_SPEED),
            ViewerInput::TouchStart { touches } => {
                self.begin_touch(touches);
                false
            }
            ViewerInput::TouchMove { touches } => self.move_touch(touches),
            ViewerInput::ResetView => {
                *self = Self::default();
                true
            }
        }
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw = wrap_angle(self.yaw - dx * ROTATE_SPEED);
        self.pitch = (self.pitch + dy * ROTATE_SPEED).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Multiply the orbit distance; >1 zooms out.
    pub fn zoom_by(&mut self, factor: f32) -> bool {
        if !factor.is_finite() || factor <= 0.0 {
            return false;
        }
        let before = self.distance;
        self.distance = (self.distance * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.distance != before
    }

    pub fn pose(&self) -> CameraPose {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        let [tx, ty, tz] = self.target;
        CameraPose {
            eye: [
                tx + self.distance * sy * cp,
                ty + self.distance * sp,
                tz + self.distance * cy * cp,
            ],
            target: self.target,
            yaw: self.yaw,
            pitch: self.pitch,
            distance: self.distance,
        }
    }

    fn drag_to(&mut self, x: f32, y: f32) -> bool {
        let Some((fx, fy)) = self.drag_from else {
            return false;
        };
        self.drag_from = Some((x, y));
        if x == fx && y == fy {
            return false;
        }
        self.rotate(x - fx, y - fy);
        true
    }

    fn begin_touch(&mut self, touches: &[TouchPoint]) {
        match touches {
            [one] => {
                self.drag_from = Some((one.x, one.y));
                self.pinch_span = None;
            }
            [a, b, ..] => {
                self.drag_from = None;
                self.pinch_span = Some(span(a, b));
            }
            [] => {}
        }
    }

    fn move_touch(&mut self, touches: &[TouchPoint]) -> bool {
        match touches {
            [one] => self.drag_to(one.x, one.y),
            [a, b, ..] => {
                let current = span(a, b);
                let previous = self.pinch_span.replace(current);
                match previous {
                    // Fingers apart = zoom in = shorter distance.
                    Some(prev) if current > f32::EPSILON => self.zoom_by(prev / current),
                    _ => false,
                }
            }
            [] => false,
        }
    }
}

fn span(a: &TouchPoint, b: &TouchPoint) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_clamped_to_45_degrees() {
        let mut controls = OrbitControls::default();
        controls.apply(&ViewerInput::PointerDown { x: 0.0, y: 0.0 });
        assert!(controls.apply(&ViewerInput::PointerMove { x: 0.0, y: 10_000.0 }));
        assert_eq!(controls.pitch, MAX_PITCH);
        controls.apply(&ViewerInput::PointerMove { x: 0.0, y: -20_000.0 });
        assert_eq!(controls.pitch, -MAX_PITCH);
    }

    #[test]
    fn yaw_is_unrestricted_but_wrapped() {
        let mut controls = OrbitControls::default();
        for _ in 0..50 {
            controls.rotate(400.0, 0.0);
        }
        assert!(controls.yaw.abs() <= PI);
        assert_ne!(controls.yaw, 0.0);
    }

    #[test]
    fn move_without_press_does_nothing() {
        let mut controls = OrbitControls::default();
        assert!(!controls.apply(&ViewerInput::PointerMove { x: 50.0, y: 50.0 }));
        controls.apply(&ViewerInput::PointerDown { x: 0.0, y: 0.0 });
        controls.apply(&ViewerInput::PointerUp);
        assert!(!controls.apply(&ViewerInput::PointerMove { x: 50.0, y: 50.0 }));
        assert_eq!(controls.yaw, 0.0);
    }

    #[test]
    fn wheel_zoom_is_clamped() {
        let mut controls = OrbitControls::default();
        controls.apply(&ViewerInput::Wheel { delta_y: 100_000.0 });
        assert_eq!(controls.distance, MAX_DISTANCE);
        controls.apply(&ViewerInput::Wheel { delta_y: -990.0 });
        assert_eq!(controls.distance, MIN_DISTANCE);
        assert!(!controls.apply(&ViewerInput::Wheel { delta_y: -500.0 }));
    }

    #[test]
    fn pinch_out_moves_camera_closer() {
        let mut controls = OrbitControls::default();
        let p = |x: f32| TouchPoint { x, y: 0.0 };
        controls.apply(&ViewerInput::TouchStart { touches: vec![p(0.0), p(100.0)] });
        assert!(controls.apply(&ViewerInput::TouchMove { touches: vec![p(0.0), p(150.0)] }));
        assert!(controls.distance < DEFAULT_DISTANCE);
    }

    #[test]
    fn eye_sits_on_the_orbit_sphere() {
        let mut controls = OrbitControls::default();
        controls.rotate(120.0, 40.0);
        let pose = controls.pose();
        let r = pose.eye.iter().map(|c| c * c).sum::<f32>().sqrt();
        assert!((r - DEFAULT_DISTANCE).abs() < 1e-4);
    }

    #[test]
    fn input_deserializes_from_webview_payload() {
        let input: ViewerInput =
            serde_json::from_str(r#"{"type":"wheel","deltaY":-120}"#).unwrap();
        assert_eq!(input, ViewerInput::Wheel { delta_y: -120.0 });
    }
}
