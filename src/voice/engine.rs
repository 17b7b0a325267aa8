//! Voice engine: event loop plus effect runner.
//!
//! The loop owns the authoritative [`State`] and feeds every event through
//! `reduce()`; effects are executed asynchronously by an [`EffectRunner`]
//! whose completion events come back over the same channel. UI snapshots
//! are published on a `watch` channel.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::machine::{reduce, Effect, Event, State};
use super::transcript::TranscriptBuffer;
use super::{
    CaptureHandle, LocalRecognizer, MicrophoneSource, Provider, RecognitionHandle,
    RecognizerEvent, VoiceApi,
};
use crate::notices::Notices;

/// Queued events before producers start dropping.
const EVENT_QUEUE: usize = 32;

/// Voice state snapshot for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VoiceUiState {
    Idle,
    Starting,
    Recording {
        provider: Provider,
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Transcribing,
    Error {
        message: String,
    },
}

fn state_to_ui(state: &State) -> VoiceUiState {
    match state {
        State::Idle => VoiceUiState::Idle,
        State::Starting { .. } => VoiceUiState::Starting,
        State::Recording {
            provider,
            elapsed_secs,
            ..
        } => VoiceUiState::Recording {
            provider: *provider,
            elapsed_secs: *elapsed_secs,
        },
        State::Transcribing { .. } => VoiceUiState::Transcribing,
        State::Error { message } => VoiceUiState::Error {
            message: message.clone(),
        },
    }
}

/// Runs effects asynchronously; completion events go back via `tx`.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    runner: Arc<dyn EffectRunner>,
    ui_tx: watch::Sender<VoiceUiState>,
) {
    let mut state = State::default();
    ui_tx.send_replace(state_to_ui(&state));
    log::debug!("Voice: state loop started");

    while let Some(event) = rx.recv().await {
        let old = std::mem::discriminant(&state);
        let (next, effects) = reduce(&state, event);
        if old != std::mem::discriminant(&next) {
            log::info!("Voice: state transition to {:?}", state_to_ui(&next));
        }
        state = next;

        for effect in effects {
            match effect {
                Effect::EmitUi => {
                    ui_tx.send_replace(state_to_ui(&state));
                }
                other => runner.spawn(other, tx.clone()),
            }
        }
    }
    log::debug!("Voice: state loop ended");
}

/// Public handle to the voice capture workflow.
pub struct VoiceCaptureEngine {
    tx: mpsc::Sender<Event>,
    ui: watch::Receiver<VoiceUiState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceCaptureEngine {
    pub fn spawn(runner: Arc<dyn EffectRunner>) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let (ui_tx, ui_rx) = watch::channel(VoiceUiState::Idle);
        let task = tokio::spawn(run_state_loop(rx, tx.clone(), runner, ui_tx));
        Self {
            tx,
            ui: ui_rx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Begin a recording attempt. Rejected while one is active (the stop
    /// intent wins, see the reducer).
    pub async fn start(&self) {
        let _ = self.tx.send(Event::StartRequested).await;
    }

    /// Stop recording. Safe from any state, including idle.
    pub async fn stop(&self) {
        let _ = self.tx.send(Event::StopRequested).await;
    }

    pub fn ui_state(&self) -> VoiceUiState {
        self.ui.borrow().clone()
    }

    /// Watch handle for composing surfaces (the chat facade subscribes to
    /// surface recording status alongside its own state).
    pub fn ui_watch(&self) -> watch::Receiver<VoiceUiState> {
        self.ui.clone()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.ui_state(), VoiceUiState::Recording { .. })
    }

    /// Stop any active session and end the state loop (surface unmount).
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Event::StopRequested).await;

        // Give the stop a moment to release resources before killing the loop.
        let mut ui = self.ui.clone();
        let settled = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match *ui.borrow_and_update() {
                    VoiceUiState::Idle | VoiceUiState::Error { .. } => break,
                    _ => {}
                }
                if ui.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if settled.is_err() {
            log::warn!("Voice: shutdown timed out waiting for idle");
        }

        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

/// Effect runner wired to the real collaborators.
pub struct VoiceEffectRunner {
    mic: Arc<dyn MicrophoneSource>,
    recognizer: Arc<dyn LocalRecognizer>,
    api: Arc<dyn VoiceApi>,
    input: Arc<Mutex<TranscriptBuffer>>,
    notices: Notices,
    captures: Mutex<HashMap<Uuid, Box<dyn CaptureHandle>>>,
    recognitions: Mutex<HashMap<Uuid, Box<dyn RecognitionHandle>>>,
    ticks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl VoiceEffectRunner {
    pub fn new(
        mic: Arc<dyn MicrophoneSource>,
        recognizer: Arc<dyn LocalRecognizer>,
        api: Arc<dyn VoiceApi>,
        input: Arc<Mutex<TranscriptBuffer>>,
        notices: Notices,
    ) -> Arc<Self> {
        Arc::new(Self {
            mic,
            recognizer,
            api,
            input,
            notices,
            captures: Mutex::new(HashMap::new()),
            recognitions: Mutex::new(HashMap::new()),
            ticks: Mutex::new(HashMap::new()),
        })
    }

    fn send_event(tx: &mpsc::Sender<Event>, event: Event) {
        let tx = tx.clone();
        tokio::spawn(async move {
            if tx.send(event).await.is_err() {
                log::debug!("Voice: event channel closed");
            }
        });
    }

    fn release(&self, id: Uuid) {
        if let Some(capture) = self.captures.lock().unwrap().remove(&id) {
            capture.abort();
        }
        if let Some(recognition) = self.recognitions.lock().unwrap().remove(&id) {
            recognition.abort();
        }
        if let Some(tick) = self.ticks.lock().unwrap().remove(&id) {
            tick.abort();
        }
    }
}

impl EffectRunner for VoiceEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::ResolveProvider { id } => {
                let api = self.api.clone();
                tokio::spawn(async move {
                    let event = match api.status().await {
                        Ok(status) if status.available => Event::ProviderResolved {
                            id,
                            provider: status.preferred,
                        },
                        Ok(_) => Event::ProviderUnavailable {
                            id,
                            reason: "Transcription is not available right now".to_string(),
                        },
                        Err(e) => Event::ProviderUnavailable {
                            id,
                            reason: e.to_string(),
                        },
                    };
                    if tx.send(event).await.is_err() {
                        log::debug!("Voice: event channel closed");
                    }
                });
            }

            Effect::AcquireDevice { id } => {
                let event = match self.mic.acquire() {
                    Ok(handle) => {
                        self.captures.lock().unwrap().insert(id, handle);
                        Event::DeviceReady {
                            id,
                            provider: Provider::Cloud,
                        }
                    }
                    Err(e) => Event::DeviceFailed {
                        id,
                        provider: Provider::Cloud,
                        err: e.to_string(),
                    },
                };
                Self::send_event(&tx, event);
            }

            Effect::StartLocalRecognition { id } => {
                let (ev_tx, mut ev_rx) = mpsc::channel::<RecognizerEvent>(EVENT_QUEUE);
                let event = match self.recognizer.start(ev_tx) {
                    Ok(handle) => {
                        self.recognitions.lock().unwrap().insert(id, handle);
                        // Forward the recognition feed into the state loop.
                        let feed_tx = tx.clone();
                        tokio::spawn(async move {
                            while let Some(ev) = ev_rx.recv().await {
                                let mapped = match ev {
                                    RecognizerEvent::Interim(text) => {
                                        Event::InterimTranscript { id, text }
                                    }
                                    RecognizerEvent::Final(text) => {
                                        Event::FinalTranscript { id, text }
                                    }
                                    RecognizerEvent::Failed(err) => {
                                        Event::RecognizerFailed { id, err }
                                    }
                                };
                                if feed_tx.send(mapped).await.is_err() {
                                    break;
                                }
                            }
                        });
                        Event::DeviceReady {
                            id,
                            provider: Provider::Local,
                        }
                    }
                    Err(e) => Event::DeviceFailed {
                        id,
                        provider: Provider::Local,
                        err: e.to_string(),
                    },
                };
                Self::send_event(&tx, event);
            }

            Effect::FinishCapture { id } => {
                let handle = self.captures.lock().unwrap().remove(&id);
                let event = match handle {
                    Some(handle) => match handle.finish() {
                        Ok(audio) => Event::CaptureFinished { id, audio },
                        Err(e) => Event::TranscribeFail {
                            id,
                            err: e.to_string(),
                        },
                    },
                    None => Event::TranscribeFail {
                        id,
                        err: "no active capture".to_string(),
                    },
                };
                Self::send_event(&tx, event);
            }

            Effect::StopLocalRecognition { id } => {
                if let Some(handle) = self.recognitions.lock().unwrap().remove(&id) {
                    handle.stop();
                }
            }

            Effect::ReleaseResources { id } => self.release(id),

            Effect::TranscribeCloud { id, audio } => {
                let api = self.api.clone();
                tokio::spawn(async move {
                    let event = match api.transcribe(audio).await {
                        Ok(text) => Event::TranscribeOk { id, text },
                        Err(e) => Event::TranscribeFail {
                            id,
                            err: e.to_string(),
                        },
                    };
                    if tx.send(event).await.is_err() {
                        log::debug!("Voice: event channel closed");
                    }
                });
            }

            Effect::StartTick { id } => {
                let tick_tx = tx;
                let task = tokio::spawn(async move {
                    let mut interval = tokio::time::interval(Duration::from_secs(1));
                    interval.tick().await; // immediate first tick
                    loop {
                        interval.tick().await;
                        if tick_tx.send(Event::Tick { id }).await.is_err() {
                            break;
                        }
                    }
                });
                if let Some(old) = self.ticks.lock().unwrap().insert(id, task) {
                    old.abort();
                }
            }

            Effect::StopTick { id } => {
                if let Some(task) = self.ticks.lock().unwrap().remove(&id) {
                    task.abort();
                }
            }

            Effect::CommitText { text } => {
                self.input.lock().unwrap().commit(&text);
            }

            Effect::SetInterim { text } => {
                self.input.lock().unwrap().set_interim(text);
            }

            Effect::ClearInterim => {
                self.input.lock().unwrap().clear_interim();
            }

            Effect::Notify { message } => self.notices.push(message),

            // Handled inside the state loop.
            Effect::EmitUi => log::debug!("Voice: EmitUi reached the runner"),
        }
    }
}
