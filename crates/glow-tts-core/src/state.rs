//! The controller's state machine: states, transition validity, and the typed event enum
//! published on every state/command/error event.

use crate::error::TtsError;
use crate::progress::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Idle,
    Initializing,
    Ready,
    Processing,
    Playing,
    Paused,
    Stopping,
    Error,
}

impl ControllerState {
    /// The trigger names are informal; this only encodes which (from, to) pairs
    /// are ever legal, per the transition table. Callers pick the trigger.
    pub fn can_transition_to(self, to: ControllerState) -> bool {
        use ControllerState::*;
        match (self, to) {
            (Idle, Initializing) => true,
            (Initializing, Ready) => true,
            (Initializing, Error) => true,
            (Ready, Processing) => true,
            (Processing, Ready) => true,
            (Ready, Playing) => true,
            (Playing, Paused) => true,
            (Paused, Playing) => true,
            (Playing, Ready) => true,
            (Paused, Ready) => true,
            (_, Stopping) => true,
            (Stopping, Idle) => true,
            (Error, Idle) => true,
            (_, Error) => true,
            _ => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ControllerState::Idle => "Idle",
            ControllerState::Initializing => "Initializing",
            ControllerState::Ready => "Ready",
            ControllerState::Processing => "Processing",
            ControllerState::Playing => "Playing",
            ControllerState::Paused => "Paused",
            ControllerState::Stopping => "Stopping",
            ControllerState::Error => "Error",
        }
    }
}

/// Published on the controller's event channel. Components only ever emit
/// events; they never mutate state owned by another component directly.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    SentenceChanged { index: usize },
    StateChanged { state: ControllerState },
    Error { kind: &'static str, message: String, recoverable: bool },
    Warning { kind: &'static str, message: String },
    ProgressTick { progress: Progress },
}

impl TtsEvent {
    pub fn from_error(err: &TtsError) -> Self {
        TtsEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
            recoverable: err.recoverable(),
        }
    }
}
