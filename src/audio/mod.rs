pub mod shutter;
pub mod tone;

use shutter::ShutterClick;
use tone::CueTone;

use anyhow::{anyhow, Context};
use rodio::{OutputStream, Sink};
use serde::Serialize;
use std::{
    sync::{
        mpsc::{self, Sender},
        Mutex,
    },
    thread,
    time::Duration,
};

/// Audible feedback points of the capture countdown.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Cue {
    /// One of the last three seconds.
    Tick,
    /// Countdown reached zero.
    Shutter,
}

const CUE_VOLUME: f32 = 0.6;

pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);
}

enum CueCommand {
    Play(Cue),
    Silence,
}

/// Open output device plus the sink cues are queued on.
struct CueOutput {
    _stream: OutputStream,
    sink: Sink,
}

impl CueOutput {
    fn open() -> anyhow::Result<Self> {
        let (stream, handle) =
            OutputStream::try_default().context("no audio output device")?;
        let sink = Sink::try_new(&handle).context("audio sink unavailable")?;
        sink.set_volume(CUE_VOLUME);
        Ok(Self {
            _stream: stream,
            sink,
        })
    }

    fn play(&self, cue: Cue) {
        match cue {
            Cue::Tick => self
                .sink
                .append(CueTone::new(880.0, Duration::from_millis(120))),
            Cue::Shutter => {
                self.sink
                    .append(CueTone::new(1320.0, Duration::from_millis(60)));
                self.sink.append(ShutterClick::new());
            }
        }
    }
}

/// Owns the (non-`Send`) output stream on the `audio-cues` thread. The
/// device is opened on the first cue and dropped again by `Silence`.
fn cue_thread() -> anyhow::Result<Sender<CueCommand>> {
    let (tx, rx) = mpsc::channel::<CueCommand>();
    thread::Builder::new()
        .name("audio-cues".into())
        .spawn(move || {
            let mut output: Option<CueOutput> = None;
            for command in rx {
                match command {
                    CueCommand::Play(cue) => {
                        if output.is_none() {
                            match CueOutput::open() {
                                Ok(opened) => output = Some(opened),
                                Err(err) => {
                                    log::warn!("Skipping {cue:?} cue: {err:#}");
                                    continue;
                                }
                            }
                        }
                        if let Some(out) = &output {
                            out.play(cue);
                        }
                    }
                    CueCommand::Silence => {
                        if let Some(out) = output.take() {
                            out.sink.stop();
                        }
                    }
                }
            }
        })
        .context("failed to spawn audio thread")?;
    Ok(tx)
}

/// Countdown cue player backed by rodio.
pub struct AudioCues {
    tx: Mutex<Option<Sender<CueCommand>>>,
}

impl AudioCues {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
        }
    }

    fn sender(&self) -> anyhow::Result<Sender<CueCommand>> {
        let mut slot = self.tx.lock().map_err(|_| anyhow!("audio lock poisoned"))?;
        if let Some(tx) = slot.as_ref() {
            return Ok(tx.clone());
        }
        let tx = cue_thread()?;
        *slot = Some(tx.clone());
        Ok(tx)
    }

    /// Cut any queued cue and release the output device.
    pub fn silence(&self) {
        let sender = self.tx.lock().ok().and_then(|slot| slot.clone());
        if let Some(tx) = sender {
            let _ = tx.send(CueCommand::Silence);
        }
    }
}

impl CuePlayer for AudioCues {
    fn play(&self, cue: Cue) {
        let sent = self
            .sender()
            .and_then(|tx| tx.send(CueCommand::Play(cue)).map_err(|e| anyhow!(e.to_string())));
        if let Err(err) = sent {
            log::warn!("Audio cue unavailable: {err:#}");
        }
    }
}
