use std::{
    sync::{
        mpsc::{self, Sender},
        Arc, OnceLock,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use image::RgbImage;
use log::{error, info, warn};
use nokhwa::{
    nokhwa_check, nokhwa_initialize,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
    Camera,
};
use tokio::sync::oneshot;

use super::{
    classify_media_error, FacingMode, FrameReceiver, MediaConstraints, MediaDevices,
    StreamSettings, VideoStream,
};
use crate::{error::AppError, settings::SettingsStore};

/// How long an open waits for the user to answer the OS camera prompt.
const PERMISSION_WAIT: Duration = Duration::from_secs(60);
const PERMISSION_POLL: Duration = Duration::from_millis(100);

enum WebcamCommand {
    Grab(oneshot::Sender<anyhow::Result<RgbImage>>),
    Stop,
}

/// Native webcam access. The device handle is not `Send` on every platform,
/// so it lives on its own thread and is driven over a command channel.
///
/// The camera index is read from the settings on every open.
pub struct WebcamDevices {
    settings: Arc<SettingsStore>,
    /// Answer to the OS permission prompt; unset while it is showing.
    permission: Arc<OnceLock<bool>>,
}

impl WebcamDevices {
    /// Asks the OS for camera access up front where the platform requires it
    /// (AVFoundation). Must run on the main thread.
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        let permission = Arc::new(OnceLock::new());
        if nokhwa_check() {
            let _ = permission.set(true);
        } else {
            let answer = Arc::clone(&permission);
            nokhwa_initialize(move |granted| {
                if !granted {
                    warn!("Camera access was not granted");
                }
                let _ = answer.set(granted);
            });
        }
        Self {
            settings,
            permission,
        }
    }

    fn configured_index(&self) -> Option<u32> {
        self.settings.capture().camera_index
    }

    /// Block until the permission prompt is answered or the wait runs out.
    fn await_permission(&self) -> Result<(), AppError> {
        let deadline = Instant::now() + PERMISSION_WAIT;
        loop {
            let prompt = self.permission.get().copied();
            if let Some(verdict) = permission_verdict(nokhwa_check(), prompt) {
                return verdict;
            }
            if Instant::now() >= deadline {
                return Err(AppError::MediaAccessDenied(
                    "camera permission request timed out".into(),
                ));
            }
            thread::sleep(PERMISSION_POLL);
        }
    }

    fn pick_device(&self, facing_mode: FacingMode) -> Result<CameraInfo, AppError> {
        let devices = query(ApiBackend::Auto).map_err(|e| classify_media_error(&e.to_string()))?;
        if devices.is_empty() {
            return Err(AppError::MediaDeviceNotFound(
                "no video input devices available".into(),
            ));
        }

        if let Some(wanted) = self.configured_index() {
            return devices
                .into_iter()
                .find(|info| matches!(info.index(), CameraIndex::Index(i) if *i == wanted))
                .ok_or_else(|| {
                    AppError::MediaDeviceNotFound(format!("no camera at index {wanted}"))
                });
        }

        // Desktop devices rarely report a facing mode; fall back to names.
        let hints: &[&str] = match facing_mode {
            FacingMode::User => &["front", "facetime", "integrated", "user"],
            FacingMode::Environment => &["back", "rear", "environment"],
        };
        let preferred = devices.iter().position(|info| {
            let name = info.human_name().to_ascii_lowercase();
            hints.iter().any(|hint| name.contains(hint))
        });

        let index = preferred.unwrap_or(0);
        Ok(devices.into_iter().nth(index).ok_or_else(|| {
            AppError::MediaDeviceNotFound("no video input devices available".into())
        })?)
    }
}

impl MediaDevices for WebcamDevices {
    fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Box<dyn VideoStream>, AppError> {
        if constraints.audio {
            return Err(AppError::MediaAccessOther(
                "audio capture is not supported".into(),
            ));
        }

        self.await_permission()?;
        let device = self.pick_device(constraints.facing_mode)?;
        let label = device.human_name();
        let index = device.index().clone();
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(constraints.ideal_width, constraints.ideal_height),
                FrameFormat::MJPEG,
                30,
            ),
        ));

        let (command_tx, command_rx) = mpsc::channel::<WebcamCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<StreamSettings, AppError>>();
        let label_for_thread = label.clone();

        let worker = thread::Builder::new()
            .name("webcam".into())
            .spawn(move || {
                let mut camera = match Camera::new(index, requested)
                    .and_then(|mut cam| cam.open_stream().map(|_| cam))
                {
                    Ok(camera) => camera,
                    Err(err) => {
                        let _ = ready_tx.send(Err(classify_media_error(&err.to_string())));
                        return;
                    }
                };

                let resolution = camera.resolution();
                let settings = StreamSettings {
                    width: resolution.width(),
                    height: resolution.height(),
                    device_label: label_for_thread,
                };
                if ready_tx.send(Ok(settings)).is_err() {
                    let _ = camera.stop_stream();
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        WebcamCommand::Grab(reply) => {
                            let frame = camera
                                .frame()
                                .and_then(|buffer| buffer.decode_image::<RgbFormat>())
                                .map_err(|e| anyhow!("failed to read frame: {e}"))
                                .and_then(|decoded| {
                                    let (width, height) = (decoded.width(), decoded.height());
                                    RgbImage::from_raw(width, height, decoded.into_raw())
                                        .context("frame buffer size mismatch")
                                });
                            let _ = reply.send(frame);
                        }
                        WebcamCommand::Stop => break,
                    }
                }

                if let Err(err) = camera.stop_stream() {
                    error!("Failed to stop webcam stream: {err}");
                }
            })
            .map_err(|e| AppError::MediaAccessOther(e.to_string()))?;

        let settings = ready_rx
            .recv()
            .map_err(|_| AppError::MediaAccessOther("webcam thread exited early".into()))??;

        info!(
            "Webcam '{}' streaming at {}x{}",
            settings.device_label, settings.width, settings.height
        );

        Ok(Box::new(WebcamStream {
            settings,
            tx: Some(command_tx),
            worker: Some(worker),
        }))
    }
}

/// `None` means the prompt is still open.
fn permission_verdict(authorized: bool, prompt: Option<bool>) -> Option<Result<(), AppError>> {
    match (authorized, prompt) {
        (true, _) | (false, Some(true)) => Some(Ok(())),
        (false, Some(false)) => Some(Err(AppError::MediaAccessDenied(
            "camera access was denied; allow it in the system privacy settings".into(),
        ))),
        (false, None) => None,
    }
}

struct WebcamStream {
    settings: StreamSettings,
    tx: Option<Sender<WebcamCommand>>,
    worker: Option<JoinHandle<()>>,
}

impl VideoStream for WebcamStream {
    fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn request_frame(&self) -> FrameReceiver {
        let (reply_tx, reply_rx) = oneshot::channel();
        match &self.tx {
            Some(tx) => {
                if let Err(mpsc::SendError(WebcamCommand::Grab(reply))) =
                    tx.send(WebcamCommand::Grab(reply_tx))
                {
                    let _ = reply.send(Err(anyhow!("webcam stream has ended")));
                }
            }
            None => {
                let _ = reply_tx.send(Err(anyhow!("webcam stream was stopped")));
            }
        }
        reply_rx
    }

    fn stop_tracks(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(WebcamCommand::Stop);
        }
        if let Some(handle) = self.worker.take() {
            if let Err(join_err) = handle.join() {
                error!("Failed to join webcam thread: {join_err:?}");
            }
            info!("Webcam '{}' released", self.settings.device_label);
        }
    }

    fn is_live(&self) -> bool {
        self.tx.is_some()
    }
}

impl Drop for WebcamStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CaptureSettings;

    #[test]
    fn declined_prompt_maps_to_access_denied() {
        assert!(matches!(
            permission_verdict(false, Some(false)),
            Some(Err(AppError::MediaAccessDenied(_)))
        ));
        assert!(permission_verdict(false, None).is_none());
        assert!(matches!(permission_verdict(false, Some(true)), Some(Ok(()))));
        assert!(matches!(permission_verdict(true, None), Some(Ok(()))));
    }

    #[test]
    fn camera_index_follows_saved_settings() {
        let path = std::env::temp_dir()
            .join(format!("avatarcam-{}-webcam.json", uuid::Uuid::new_v4()));
        let settings = Arc::new(SettingsStore::new(path.clone()).unwrap());
        let devices = WebcamDevices::new(Arc::clone(&settings));
        assert_eq!(devices.configured_index(), None);

        settings
            .update_capture(CaptureSettings {
                camera_index: Some(2),
                ..settings.capture()
            })
            .unwrap();
        assert_eq!(devices.configured_index(), Some(2));
        std::fs::remove_file(path).ok();
    }
}
