mod audio;
mod camera;
mod capture;
mod error;
mod models;
mod poses;
mod quality;
mod settings;
mod submission;
mod utils;
mod viewer;

use std::sync::Arc;

use audio::AudioCues;
use camera::webcam::WebcamDevices;
use capture::{
    commands::{
        cancel_countdown, close_camera, get_capture_state, get_pose_catalog, open_camera,
        reset_capture_session, retake_photo, select_timer, start_countdown,
    },
    CaptureController, SessionEvent,
};
use serde::Serialize;
use settings::{CaptureSettings, SettingsStore};
use submission::{
    client::http_client,
    commands::{clear_avatar_result, get_avatar_result, submit_measurements},
    SubmissionService,
};
use tauri::{AppHandle, Emitter, Manager, RunEvent, State};
use tokio::sync::broadcast::{self, error::RecvError};
use viewer::{
    commands::{get_viewer_state, viewer_input, viewer_load, viewer_teardown, WebviewFrameSink},
    MannequinViewer, ViewerEvent,
};

pub(crate) struct AppState {
    audio: Arc<AudioCues>,
    pub(crate) capture: CaptureController,
    pub(crate) viewer: MannequinViewer,
    pub(crate) submission: SubmissionService,
    pub(crate) settings: Arc<SettingsStore>,
}

#[tauri::command]
fn get_capture_settings(state: State<AppState>) -> Result<CaptureSettings, String> {
    Ok(state.settings.capture())
}

#[tauri::command]
fn set_capture_settings(
    settings: CaptureSettings,
    state: State<AppState>,
    app_handle: AppHandle,
) -> Result<(), String> {
    state
        .settings
        .update_capture(settings.clone())
        .map_err(|e| e.to_string())?;

    // The camera index is read on the next open, the default timer on the
    // next reset.
    state.capture.set_audio_cues(settings.audio_cues_enabled);
    state.capture.set_default_timer(settings.default_timer);

    app_handle
        .emit("capture-settings-updated", &settings)
        .map_err(|e| e.to_string())?;

    Ok(())
}

/// Relay broadcast events to the webview until the sender goes away.
fn forward_events<E, F>(app_handle: AppHandle, mut rx: broadcast::Receiver<E>, emit: F)
where
    E: Clone + Send + 'static,
    F: Fn(&AppHandle, E) -> tauri::Result<()> + Send + 'static,
{
    tauri::async_runtime::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(err) = emit(&app_handle, event) {
                        log::warn!("Failed to forward event to webview: {err}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Webview event relay skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn emit_payload<P: Serialize + Clone>(
    app_handle: &AppHandle,
    name: &str,
    payload: P,
) -> tauri::Result<()> {
    app_handle.emit(name, payload)
}

fn emit_session_event(app_handle: &AppHandle, event: SessionEvent) -> tauri::Result<()> {
    let name = event.name();
    match event {
        SessionEvent::PhotosUpdated(update) => emit_payload(app_handle, name, update),
        SessionEvent::CountdownTick(tick) => emit_payload(app_handle, name, tick),
        SessionEvent::CaptureError(err) => emit_payload(app_handle, name, err),
    }
}

fn emit_viewer_event(app_handle: &AppHandle, event: ViewerEvent) -> tauri::Result<()> {
    let name = event.name();
    match event {
        ViewerEvent::Ready(info) => emit_payload(app_handle, name, info),
        ViewerEvent::Error(err) => emit_payload(app_handle, name, err),
    }
}

fn shutdown(app_handle: &AppHandle) {
    let Some(state) = app_handle.try_state::<AppState>() else {
        return;
    };
    let capture = state.capture.clone();
    let viewer = state.viewer.clone();
    tauri::async_runtime::block_on(async move {
        if capture.is_streaming().await {
            capture.close_camera().await;
        }
        viewer.teardown().await;
    });
    state.audio.silence();
    log::info!("Camera and viewer released");
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    let level = if settings::debug_logging_requested() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("avatarcam starting up...");

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings_path = app_data_dir.join("settings.json");
                let settings_store = Arc::new(SettingsStore::new(settings_path)?);
                let initial = settings_store.capture();

                let audio = Arc::new(AudioCues::new());
                let capture = CaptureController::new(
                    Arc::new(WebcamDevices::new(Arc::clone(&settings_store))),
                    audio.clone(),
                    initial.default_timer,
                );
                capture.set_audio_cues(initial.audio_cues_enabled);

                let viewer =
                    MannequinViewer::new(Arc::new(WebviewFrameSink::new(app.handle().clone())));

                forward_events(app.handle().clone(), capture.subscribe(), emit_session_event);
                forward_events(app.handle().clone(), viewer.subscribe(), emit_viewer_event);

                app.manage(AppState {
                    audio,
                    capture,
                    viewer,
                    submission: SubmissionService::new(http_client()?),
                    settings: settings_store,
                });

                log::info!("Analysis server: {}", initial.api_base_url);
                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            get_pose_catalog,
            get_capture_state,
            open_camera,
            close_camera,
            select_timer,
            start_countdown,
            cancel_countdown,
            retake_photo,
            reset_capture_session,
            viewer_load,
            viewer_input,
            viewer_teardown,
            get_viewer_state,
            submit_measurements,
            get_avatar_result,
            clear_avatar_result,
            get_capture_settings,
            set_capture_settings,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if let RunEvent::Exit = event {
            shutdown(app_handle);
        }
    });
}
