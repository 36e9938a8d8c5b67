use crate::state::Phase;

/// Convenience result type used across the compositor.
pub type GroupShotResult<T> = Result<T, GroupShotError>;

/// Everything that can make a single operation fail.
///
/// None of these leave the composition in a half-updated state: a failed
/// operation is rejected as a whole and the caller may carry on.
#[derive(thiserror::Error, Debug)]
pub enum GroupShotError {
    /// Operation not valid in the current phase.
    #[error("invalid transition: cannot {op} while {phase:?}")]
    InvalidTransition { op: &'static str, phase: Phase },

    /// An add-person request is already in flight.
    #[error("busy: an add-person request is already pending")]
    Busy,

    /// A layer does not match the canvas fixed at background-lock time.
    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The segmentation model errored or produced no usable mask.
    #[error("segmentation failed: {0}")]
    SegmentationFailed(String),

    /// A result for a request that no longer belongs to this session.
    #[error("stale result for request {token} (pending: {pending:?})")]
    StaleResult { token: u64, pending: Option<u64> },

    /// Extractor settings that cannot be applied.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Capture, model, export or IO failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error categories the presentation layer can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTransition,
    Busy,
    DimensionMismatch,
    SegmentationFailed,
    StaleResult,
    InvalidSettings,
    Other,
}

impl ErrorKind {
    /// One message per category; the UI is free to reword it.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::InvalidTransition => "That step is not available right now.",
            ErrorKind::Busy => "Still processing the last person. Try again in a moment.",
            ErrorKind::DimensionMismatch => "Camera size changed since the background was locked. Reset to start over.",
            ErrorKind::SegmentationFailed => "Segmentation failed.",
            ErrorKind::StaleResult => "",
            ErrorKind::InvalidSettings => "Invalid settings.",
            ErrorKind::Other => "Something went wrong. Try again.",
        }
    }

    /// Whether the UI should show anything at all.
    pub fn is_user_visible(self) -> bool {
        self != ErrorKind::StaleResult
    }
}

impl GroupShotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GroupShotError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            GroupShotError::Busy => ErrorKind::Busy,
            GroupShotError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            GroupShotError::SegmentationFailed(_) => ErrorKind::SegmentationFailed,
            GroupShotError::StaleResult { .. } => ErrorKind::StaleResult,
            GroupShotError::InvalidSettings(_) => ErrorKind::InvalidSettings,
            GroupShotError::Other(_) => ErrorKind::Other,
        }
    }

    /// Build a [`GroupShotError::SegmentationFailed`] value.
    pub fn segmentation(msg: impl Into<String>) -> Self {
        Self::SegmentationFailed(msg.into())
    }

    /// Build a [`GroupShotError::InvalidSettings`] value.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }
}
