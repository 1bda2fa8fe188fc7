use serde_json::Value;
use tauri::{AppHandle, Emitter, State};

use crate::{
    error::AppError,
    submission::{form::MeasurementForm, handoff::RESULT_SLOT, SubmissionReceipt},
    AppState,
};

#[tauri::command]
pub async fn submit_measurements(
    form: MeasurementForm,
    state: State<'_, AppState>,
    app_handle: AppHandle,
) -> Result<SubmissionReceipt, AppError> {
    let base_url = state.settings.capture().api_base_url;
    let receipt = state
        .submission
        .submit(&base_url, &form, &state.capture)
        .await?;

    if let Err(err) = app_handle.emit("navigate", &receipt.redirect_to) {
        log::warn!("Failed to request navigation: {err}");
    }
    Ok(receipt)
}

#[tauri::command]
pub fn get_avatar_result(state: State<'_, AppState>) -> Result<Option<Value>, String> {
    state.submission.handoff().result().map_err(|e| e.to_string())
}

/// Called by the results view once it has rendered the stored result.
#[tauri::command]
pub fn clear_avatar_result(state: State<'_, AppState>) -> Result<bool, String> {
    state
        .submission
        .handoff()
        .clear(RESULT_SLOT)
        .map_err(|e| e.to_string())
}
