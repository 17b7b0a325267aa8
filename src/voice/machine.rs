//! Voice capture state machine.
//!
//! Single-writer pattern: all transitions go through `reduce()`, which
//! returns the next state and a list of effects for the runner. The
//! cloud→local fallback is an explicit transition edge here (not a nested
//! error handler), so it is unit-testable in isolation:
//!
//! - cloud device acquisition fails while starting → start local recognition
//!   for the same session
//! - cloud transcription (or capture finalization) fails → fresh local
//!   recording attempt under a new session id

use uuid::Uuid;

use super::Provider;

/// Authoritative state of the voice capture workflow.
#[derive(Debug, Clone)]
pub enum State {
    Idle,
    /// Resolving the provider and acquiring the device/recognizer.
    Starting { session_id: Uuid },
    Recording {
        session_id: Uuid,
        provider: Provider,
        elapsed_secs: u64,
    },
    /// Cloud only: one-shot transcription of the captured audio.
    Transcribing { session_id: Uuid },
    Error { message: String },
}

impl Default for State {
    fn default() -> Self {
        State::Idle
    }
}

/// Events from the operator, the tick timer, and the collaborators.
#[derive(Debug, Clone)]
pub enum Event {
    /// Operator pressed the microphone control.
    StartRequested,
    /// Operator stopped (or the surface unmounted). Safe from any state.
    StopRequested,

    // Provider resolution
    ProviderResolved { id: Uuid, provider: Provider },
    ProviderUnavailable { id: Uuid, reason: String },

    // Device / recognizer lifecycle
    DeviceReady { id: Uuid, provider: Provider },
    DeviceFailed {
        id: Uuid,
        provider: Provider,
        err: String,
    },
    RecognizerFailed { id: Uuid, err: String },

    // Local recognition stream
    InterimTranscript { id: Uuid, text: String },
    FinalTranscript { id: Uuid, text: String },

    // Cloud path
    CaptureFinished { id: Uuid, audio: Vec<u8> },
    TranscribeOk { id: Uuid, text: String },
    TranscribeFail { id: Uuid, err: String },

    /// One-second timer while recording.
    Tick { id: Uuid },
}

/// Effects executed asynchronously by the runner.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Query the voice-status endpoint for availability and provider.
    ResolveProvider { id: Uuid },
    /// Acquire the microphone for the cloud capture path.
    AcquireDevice { id: Uuid },
    /// Start the continuous local recognition feed.
    StartLocalRecognition { id: Uuid },
    /// Stop the cloud capture and yield the audio payload.
    FinishCapture { id: Uuid },
    /// Graceful local stop: flush pending final text, end the feed.
    StopLocalRecognition { id: Uuid },
    /// Unconditionally release the device, recognition feed, and tick for
    /// this session. Safe when nothing is held.
    ReleaseResources { id: Uuid },
    /// One-shot cloud transcription of the captured audio.
    TranscribeCloud { id: Uuid, audio: Vec<u8> },
    StartTick { id: Uuid },
    StopTick { id: Uuid },
    /// Append a confirmed fragment to the shared input buffer.
    CommitText { text: String },
    /// Update the transient interim display buffer.
    SetInterim { text: String },
    ClearInterim,
    /// Transient user-visible notice.
    Notify { message: String },
    /// Publish the UI state snapshot.
    EmitUi,
}

/// Reducer: (state, event) -> (next_state, effects).
///
/// Events carrying a session id that does not match the current session are
/// dropped; a stale cloud response after `stop()` is discarded here.
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    let current_id: Option<Uuid> = match state {
        Idle | Error { .. } => None,
        Starting { session_id } => Some(*session_id),
        Recording { session_id, .. } => Some(*session_id),
        Transcribing { session_id } => Some(*session_id),
    };
    let is_stale = |eid: Uuid| Some(eid) != current_id;

    match (state, event) {
        // -----------------
        // Idle / Error
        // -----------------
        (Idle, StartRequested) | (Error { .. }, StartRequested) => {
            let id = Uuid::new_v4();
            (
                Starting { session_id: id },
                vec![ResolveProvider { id }, EmitUi],
            )
        }
        (Idle, StopRequested) => (Idle, vec![]),
        (Error { .. }, StopRequested) => (Idle, vec![EmitUi]),

        // -----------------
        // Starting
        // -----------------
        (Starting { session_id }, ProviderResolved { id, provider }) if *session_id == id => {
            let effect = match provider {
                Provider::Cloud => AcquireDevice { id },
                Provider::Local => StartLocalRecognition { id },
            };
            (Starting { session_id: id }, vec![effect])
        }
        (Starting { session_id }, ProviderUnavailable { id, reason }) if *session_id == id => {
            (Idle, vec![Notify { message: reason }, EmitUi])
        }
        (Starting { session_id }, DeviceReady { id, provider }) if *session_id == id => (
            Recording {
                session_id: id,
                provider,
                elapsed_secs: 0,
            },
            vec![StartTick { id }, EmitUi],
        ),
        // Cloud device failure: fall back to local immediately, same session.
        (
            Starting { session_id },
            DeviceFailed {
                id,
                provider: Provider::Cloud,
                err,
            },
        ) if *session_id == id => (
            Starting { session_id: id },
            vec![
                Notify {
                    message: format!("Microphone unavailable, using local recognition ({})", err),
                },
                StartLocalRecognition { id },
            ],
        ),
        (
            Starting { session_id },
            DeviceFailed {
                id,
                provider: Provider::Local,
                err,
            },
        ) if *session_id == id => (
            Error {
                message: err.clone(),
            },
            vec![
                ReleaseResources { id },
                Notify { message: err },
                EmitUi,
            ],
        ),
        (Starting { .. }, StartRequested) => (state.clone(), vec![]),
        (Starting { session_id }, StopRequested) => (
            Idle,
            vec![
                ReleaseResources {
                    id: *session_id,
                },
                EmitUi,
            ],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Recording {
                session_id,
                provider,
                elapsed_secs,
            },
            Tick { id },
        ) if *session_id == id => (
            Recording {
                session_id: id,
                provider: *provider,
                elapsed_secs: elapsed_secs + 1,
            },
            vec![EmitUi],
        ),
        (
            Recording {
                session_id,
                provider: Provider::Local,
                ..
            },
            InterimTranscript { id, text },
        ) if *session_id == id => (state.clone(), vec![SetInterim { text }, EmitUi]),
        (
            Recording {
                session_id,
                provider: Provider::Local,
                ..
            },
            FinalTranscript { id, text },
        ) if *session_id == id => (
            state.clone(),
            vec![CommitText { text }, ClearInterim, EmitUi],
        ),
        (Recording { session_id, .. }, RecognizerFailed { id, err }) if *session_id == id => (
            Error {
                message: err.clone(),
            },
            vec![
                StopTick { id },
                ReleaseResources { id },
                Notify { message: err },
                EmitUi,
            ],
        ),
        // Stop intent wins; a second start while recording is treated as stop.
        (
            Recording {
                session_id,
                provider: Provider::Local,
                ..
            },
            StopRequested | StartRequested,
        ) => (
            Idle,
            vec![
                StopTick { id: *session_id },
                StopLocalRecognition { id: *session_id },
                ReleaseResources { id: *session_id },
                EmitUi,
            ],
        ),
        (
            Recording {
                session_id,
                provider: Provider::Cloud,
                ..
            },
            StopRequested | StartRequested,
        ) => (
            Transcribing {
                session_id: *session_id,
            },
            vec![
                StopTick { id: *session_id },
                FinishCapture { id: *session_id },
                EmitUi,
            ],
        ),

        // -----------------
        // Transcribing (cloud only)
        // -----------------
        (Transcribing { session_id }, CaptureFinished { id, audio }) if *session_id == id => {
            (state.clone(), vec![TranscribeCloud { id, audio }])
        }
        (Transcribing { session_id }, TranscribeOk { id, text }) if *session_id == id => (
            Idle,
            vec![
                CommitText { text },
                ClearInterim,
                ReleaseResources { id },
                EmitUi,
            ],
        ),
        // Cloud transcription failed: fresh local recording attempt instead
        // of a dead end.
        (Transcribing { session_id }, TranscribeFail { id, err }) if *session_id == id => {
            let retry_id = Uuid::new_v4();
            (
                Starting {
                    session_id: retry_id,
                },
                vec![
                    Notify {
                        message: format!(
                            "Cloud transcription failed, retrying locally ({})",
                            err
                        ),
                    },
                    ReleaseResources { id },
                    StartLocalRecognition { id: retry_id },
                    EmitUi,
                ],
            )
        }
        (Transcribing { session_id }, StopRequested) => (
            Idle,
            vec![
                ReleaseResources {
                    id: *session_id,
                },
                EmitUi,
            ],
        ),
        (Transcribing { .. }, StartRequested) => (state.clone(), vec![]),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, ProviderResolved { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, ProviderUnavailable { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, DeviceReady { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, DeviceFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, RecognizerFailed { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, InterimTranscript { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, FinalTranscript { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, CaptureFinished { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TranscribeOk { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, TranscribeFail { id, .. }) if is_stale(id) => (state.clone(), vec![]),
        (_, Tick { id }) if is_stale(id) => (state.clone(), vec![]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn starting() -> (State, Uuid) {
        let (state, _) = reduce(&State::Idle, Event::StartRequested);
        let id = match state {
            State::Starting { session_id } => session_id,
            ref other => panic!("expected Starting, got {:?}", other),
        };
        (state, id)
    }

    fn recording(provider: Provider) -> (State, Uuid) {
        let (state, id) = starting();
        let (state, _) = reduce(&state, Event::ProviderResolved { id, provider });
        let (state, _) = reduce(&state, Event::DeviceReady { id, provider });
        assert!(matches!(state, State::Recording { .. }));
        (state, id)
    }

    #[test]
    fn start_resolves_provider() {
        let (state, effects) = reduce(&State::Idle, Event::StartRequested);
        assert!(matches!(state, State::Starting { .. }));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ResolveProvider { .. })));
    }

    #[test]
    fn unavailable_backend_stays_idle_with_notice() {
        let (state, id) = starting();
        let (next, effects) = reduce(
            &state,
            Event::ProviderUnavailable {
                id,
                reason: "no backend".to_string(),
            },
        );
        assert!(matches!(next, State::Idle));
        assert!(effects.iter().any(|e| matches!(e, Effect::Notify { .. })));
    }

    #[test]
    fn cloud_provider_acquires_device_then_records() {
        let (state, id) = starting();
        let (state, effects) = reduce(
            &state,
            Event::ProviderResolved {
                id,
                provider: Provider::Cloud,
            },
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::AcquireDevice { .. })));

        let (state, effects) = reduce(
            &state,
            Event::DeviceReady {
                id,
                provider: Provider::Cloud,
            },
        );
        assert!(
            matches!(state, State::Recording { provider: Provider::Cloud, elapsed_secs: 0, .. })
        );
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTick { .. })));
    }

    #[test]
    fn cloud_device_failure_falls_back_to_local_same_session() {
        let (state, id) = starting();
        let (state, _) = reduce(
            &state,
            Event::ProviderResolved {
                id,
                provider: Provider::Cloud,
            },
        );
        let (state, effects) = reduce(
            &state,
            Event::DeviceFailed {
                id,
                provider: Provider::Cloud,
                err: "mic busy".to_string(),
            },
        );
        assert!(matches!(state, State::Starting { session_id } if session_id == id));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartLocalRecognition { .. })));

        // Local recognition comes up: recording within one retry.
        let (state, _) = reduce(
            &state,
            Event::DeviceReady {
                id,
                provider: Provider::Local,
            },
        );
        assert!(matches!(
            state,
            State::Recording {
                provider: Provider::Local,
                ..
            }
        ));
    }

    #[test]
    fn cloud_transcription_failure_retries_locally() {
        let (state, id) = recording(Provider::Cloud);
        let (state, _) = reduce(&state, Event::StopRequested);
        assert!(matches!(state, State::Transcribing { .. }));

        let (state, _) = reduce(
            &state,
            Event::CaptureFinished {
                id,
                audio: vec![1, 2, 3],
            },
        );
        let (state, effects) = reduce(
            &state,
            Event::TranscribeFail {
                id,
                err: "503".to_string(),
            },
        );
        let retry_id = match state {
            State::Starting { session_id } => session_id,
            ref other => panic!("expected Starting, got {:?}", other),
        };
        assert_ne!(retry_id, id, "fallback is a fresh recording attempt");
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StartLocalRecognition { id } if *id == retry_id)));
        assert!(effects.iter().any(|e| matches!(e, Effect::Notify { .. })));

        let (state, _) = reduce(
            &state,
            Event::DeviceReady {
                id: retry_id,
                provider: Provider::Local,
            },
        );
        assert!(matches!(
            state,
            State::Recording {
                provider: Provider::Local,
                ..
            }
        ));
    }

    #[test]
    fn cloud_happy_path_commits_text() {
        let (state, id) = recording(Provider::Cloud);
        let (state, effects) = reduce(&state, Event::StopRequested);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::FinishCapture { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::StopTick { .. })));

        let (state, _) = reduce(&state, Event::CaptureFinished { id, audio: vec![0] });
        let (state, effects) = reduce(
            &state,
            Event::TranscribeOk {
                id,
                text: "deploy now".to_string(),
            },
        );
        assert!(matches!(state, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::CommitText { text } if text == "deploy now")));
    }

    #[test]
    fn local_final_fragment_commits_and_clears_interim() {
        let (state, id) = recording(Provider::Local);
        let (state, effects) = reduce(
            &state,
            Event::InterimTranscript {
                id,
                text: "hel".to_string(),
            },
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::SetInterim { text } if text == "hel")));

        let (_, effects) = reduce(
            &state,
            Event::FinalTranscript {
                id,
                text: "hello world".to_string(),
            },
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::CommitText { text } if text == "hello world")));
        assert!(effects.iter().any(|e| matches!(e, Effect::ClearInterim)));
    }

    #[test]
    fn stop_in_idle_is_a_no_op() {
        let (next, effects) = reduce(&State::Idle, Event::StopRequested);
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn double_stop_during_recording_releases_once() {
        let (state, _) = recording(Provider::Local);
        let (state, effects) = reduce(&state, Event::StopRequested);
        assert!(matches!(state, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ReleaseResources { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::StopTick { .. })));

        let (state, effects) = reduce(&state, Event::StopRequested);
        assert!(matches!(state, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn start_while_recording_is_treated_as_stop() {
        let (state, _) = recording(Provider::Local);
        let (next, effects) = reduce(&state, Event::StartRequested);
        assert!(matches!(next, State::Idle));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::StopLocalRecognition { .. })));
    }

    #[test]
    fn tick_increments_elapsed_and_is_cancelled_on_exit() {
        let (state, id) = recording(Provider::Local);
        let (state, _) = reduce(&state, Event::Tick { id });
        let (state, _) = reduce(&state, Event::Tick { id });
        assert!(matches!(state, State::Recording { elapsed_secs: 2, .. }));

        let (_, effects) = reduce(&state, Event::StopRequested);
        assert!(effects.iter().any(|e| matches!(e, Effect::StopTick { .. })));
    }

    #[test]
    fn stale_cloud_response_after_stop_is_discarded() {
        let (state, id) = recording(Provider::Cloud);
        let (state, _) = reduce(&state, Event::StopRequested);
        let (state, _) = reduce(&state, Event::StopRequested); // operator bails out
        assert!(matches!(state, State::Idle));

        let (next, effects) = reduce(
            &state,
            Event::TranscribeOk {
                id,
                text: "too late".to_string(),
            },
        );
        assert!(matches!(next, State::Idle));
        assert!(effects.is_empty());
    }

    #[test]
    fn stale_tick_is_ignored() {
        let (state, _) = recording(Provider::Local);
        let stale = Uuid::new_v4();
        let (next, effects) = reduce(&state, Event::Tick { id: stale });
        assert!(matches!(next, State::Recording { elapsed_secs: 0, .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn recognizer_failure_ends_session_with_notice() {
        let (state, id) = recording(Provider::Local);
        let (next, effects) = reduce(
            &state,
            Event::RecognizerFailed {
                id,
                err: "feed died".to_string(),
            },
        );
        assert!(matches!(next, State::Error { .. }));
        assert!(effects.iter().any(|e| matches!(e, Effect::Notify { .. })));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ReleaseResources { .. })));

        // Error is not a dead end.
        let (next, _) = reduce(&next, Event::StartRequested);
        assert!(matches!(next, State::Starting { .. }));
    }
}
