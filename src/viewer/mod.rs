pub mod asset;
pub mod commands;
pub mod controller;
pub mod orbit;

pub use asset::SceneInfo;
pub use controller::{FrameSink, MannequinViewer, ViewerEvent, ViewerFrame};
pub use orbit::{CameraPose, ViewerInput};
