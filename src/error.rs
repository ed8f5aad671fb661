use crate::types::{ElementKind, Uid};

pub type ReplayResult<T> = Result<T, ReplayError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// The recording does not have the required shape. Fatal to load.
    #[error("malformed scene: {0}")]
    MalformedScene(String),

    #[error("duplicate element: {0}")]
    DuplicateElement(Uid),

    #[error("unknown element: {0}")]
    UnknownElement(Uid),

    #[error("element type mismatch: {uid} is a {expected}, diff targets a {found}")]
    TypeMismatch {
        uid: Uid,
        expected: ElementKind,
        found: ElementKind,
    },

    /// A replay was started from a step outside the log. Callers clamp
    /// targets, so this indicates a bookkeeping bug.
    #[error("invalid step range: step {step} outside 0..={last}")]
    InvalidStepRange { step: usize, last: usize },

    #[error("missing active camera: {0}")]
    MissingActiveCamera(String),
}

impl ReplayError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedScene(msg.into())
    }

    pub fn missing_camera(msg: impl Into<String>) -> Self {
        Self::MissingActiveCamera(msg.into())
    }

    /// Errors raised by frame store mutation. These corrupt the working copy
    /// and must stop playback.
    pub fn is_replay_fault(&self) -> bool {
        matches!(
            self,
            Self::DuplicateElement(_)
                | Self::UnknownElement(_)
                | Self::TypeMismatch { .. }
                | Self::InvalidStepRange { .. }
        )
    }
}

impl From<serde_json::Error> for ReplayError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedScene(err.to_string())
    }
}
