use tauri::State;

use crate::{
    capture::{CaptureController, SessionSnapshot},
    error::AppError,
    models::TimerSetting,
    poses::{Pose, POSES},
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> CaptureController {
    state.capture.clone()
}

#[tauri::command]
pub fn get_pose_catalog() -> Vec<Pose> {
    POSES.to_vec()
}

#[tauri::command]
pub async fn get_capture_state(state: State<'_, AppState>) -> Result<SessionSnapshot, AppError> {
    Ok(controller_from_state(&state).snapshot().await)
}

#[tauri::command]
pub async fn open_camera(state: State<'_, AppState>) -> Result<SessionSnapshot, AppError> {
    controller_from_state(&state).open_camera().await
}

#[tauri::command]
pub async fn close_camera(state: State<'_, AppState>) -> Result<SessionSnapshot, AppError> {
    Ok(controller_from_state(&state).close_camera().await)
}

#[tauri::command]
pub async fn select_timer(
    state: State<'_, AppState>,
    seconds: u8,
) -> Result<SessionSnapshot, AppError> {
    let timer = TimerSetting::try_from(seconds).map_err(AppError::InvalidInput)?;
    controller_from_state(&state).select_timer(timer).await
}

#[tauri::command]
pub async fn start_countdown(state: State<'_, AppState>) -> Result<SessionSnapshot, AppError> {
    controller_from_state(&state).start_countdown().await
}

#[tauri::command]
pub async fn cancel_countdown(state: State<'_, AppState>) -> Result<SessionSnapshot, AppError> {
    Ok(controller_from_state(&state).cancel_countdown().await)
}

#[tauri::command]
pub async fn retake_photo(state: State<'_, AppState>) -> Result<SessionSnapshot, AppError> {
    controller_from_state(&state).retake().await
}

#[tauri::command]
pub async fn reset_capture_session(
    state: State<'_, AppState>,
) -> Result<SessionSnapshot, AppError> {
    Ok(controller_from_state(&state).reset_session().await)
}
