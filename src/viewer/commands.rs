use std::path::PathBuf;

use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::{
    error::AppError,
    viewer::{CameraPose, FrameSink, MannequinViewer, SceneInfo, ViewerFrame, ViewerInput},
    AppState,
};

/// Forwards frames to the webview canvas as `viewer-frame` events.
pub struct WebviewFrameSink {
    app_handle: AppHandle,
}

impl WebviewFrameSink {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl FrameSink for WebviewFrameSink {
    fn present(&self, frame: &ViewerFrame) -> Result<(), String> {
        self.app_handle
            .emit("viewer-frame", frame)
            .map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerStatus {
    pub scene: Option<SceneInfo>,
    pub camera: CameraPose,
    pub running: bool,
}

fn viewer_from_state(state: &State<'_, AppState>) -> MannequinViewer {
    state.viewer.clone()
}

/// Relative paths are looked up in the bundled resources.
fn resolve_model_path(app_handle: &AppHandle, path: &str) -> Result<PathBuf, AppError> {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        return Ok(candidate);
    }
    let resources = app_handle
        .path()
        .resource_dir()
        .map_err(|e| AppError::ViewerLoadError(e.to_string()))?;
    Ok(resources.join(candidate))
}

#[tauri::command]
pub async fn viewer_load(
    path: String,
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<SceneInfo, AppError> {
    let model_path = resolve_model_path(&app_handle, &path)?;
    viewer_from_state(&state).load(&model_path).await
}

#[tauri::command]
pub async fn viewer_input(
    input: ViewerInput,
    state: State<'_, AppState>,
) -> Result<CameraPose, AppError> {
    Ok(viewer_from_state(&state).handle_input(&input).await)
}

#[tauri::command]
pub async fn viewer_teardown(state: State<'_, AppState>) -> Result<bool, AppError> {
    Ok(viewer_from_state(&state).teardown().await)
}

#[tauri::command]
pub async fn get_viewer_state(state: State<'_, AppState>) -> Result<ViewerStatus, AppError> {
    let viewer = viewer_from_state(&state);
    Ok(ViewerStatus {
        scene: viewer.scene_info().await,
        camera: viewer.camera().await,
        running: viewer.is_running().await,
    })
}
