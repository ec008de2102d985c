//! The `PasteboardError` taxonomy returned to every caller of the service.
//!
//! Each variant maps to a stable numeric code so it can cross the IPC and
//! peer-link boundaries as a plain `u32` inside a status frame.  Code `0` is
//! reserved for success and never constructed as an error.
//!
//! # Propagation policy
//!
//! Gate and resolution failures are always *returned* to the immediate caller.
//! The daemon logs them and keeps serving; a single failed request never
//! touches another user's state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status code used on the wire for a successful request.
pub const E_OK: u32 = 0;

/// Errors surfaced by the pasteboard service and its core helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[repr(u32)]
pub enum PasteboardError {
    /// Malformed request: negative or oversized declared length, too many
    /// records, missing callback with no fallback, unknown option value.
    #[error("invalid parameter")]
    InvalidParam = 1,

    /// The payload content is structurally unusable (for example an empty
    /// payload that is not marked as delayed).
    #[error("invalid data")]
    InvalidData = 2,

    /// The number of bytes transferred differs from the declared size.
    #[error("declared size does not match transferred size")]
    InvalidDataSize = 3,

    /// No payload exists for the requested scope.
    #[error("no data")]
    NoData = 4,

    /// Encoding or decoding of the record model failed.
    #[error("serialization failed")]
    Serialization = 5,

    /// The stored payload is older than the aging window.
    #[error("data expired")]
    DataExpired = 6,

    /// Screen-state or share-option mismatch between writer and reader.
    #[error("cross border access denied")]
    CrossBorder = 7,

    /// A delayed entry could not be materialised.
    #[error("failed to get entry value")]
    GetEntryValueFailed = 8,

    /// A delayed remote HTML entry could not be rebuilt.
    #[error("failed to rebuild html")]
    RebuildHtmlFailed = 9,

    /// The remote-sync backend is not available.
    #[error("remote sync plugin is not available")]
    PluginIsNull = 10,

    /// The observer could not be registered (limit reached or sink closed).
    #[error("failed to add observer")]
    AddObserverFailed = 11,

    /// The out-of-process progress UI could not be started.
    #[error("failed to start progress")]
    ProgressStartError = 12,

    /// A collaborator service could not be obtained.
    #[error("failed to obtain system service")]
    ObtainServerSaError = 13,

    /// The caller lacks the read permission and is not the focused app.
    #[error("permission verification failed")]
    PermissionVerification = 14,

    /// A remote fetch or point-to-point link failed or timed out.
    #[error("remote data fetch failed")]
    RemoteDataFailed = 15,
}

/// Convenience alias used throughout the workspace.
pub type PasteResult<T> = Result<T, PasteboardError>;

impl PasteboardError {
    /// Returns the stable numeric code for this error.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Maps a wire code back to an error.
    ///
    /// Returns `None` for [`E_OK`] and for codes this build does not know.
    pub fn from_code(code: u32) -> Option<Self> {
        let err = match code {
            1 => Self::InvalidParam,
            2 => Self::InvalidData,
            3 => Self::InvalidDataSize,
            4 => Self::NoData,
            5 => Self::Serialization,
            6 => Self::DataExpired,
            7 => Self::CrossBorder,
            8 => Self::GetEntryValueFailed,
            9 => Self::RebuildHtmlFailed,
            10 => Self::PluginIsNull,
            11 => Self::AddObserverFailed,
            12 => Self::ProgressStartError,
            13 => Self::ObtainServerSaError,
            14 => Self::PermissionVerification,
            15 => Self::RemoteDataFailed,
            _ => return None,
        };
        Some(err)
    }
}

/// Converts a `PasteResult<()>` into the wire status code.
pub fn status_code(result: &PasteResult<()>) -> u32 {
    match result {
        Ok(()) => E_OK,
        Err(e) => e.code(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PasteboardError; 15] = [
        PasteboardError::InvalidParam,
        PasteboardError::InvalidData,
        PasteboardError::InvalidDataSize,
        PasteboardError::NoData,
        PasteboardError::Serialization,
        PasteboardError::DataExpired,
        PasteboardError::CrossBorder,
        PasteboardError::GetEntryValueFailed,
        PasteboardError::RebuildHtmlFailed,
        PasteboardError::PluginIsNull,
        PasteboardError::AddObserverFailed,
        PasteboardError::ProgressStartError,
        PasteboardError::ObtainServerSaError,
        PasteboardError::PermissionVerification,
        PasteboardError::RemoteDataFailed,
    ];

    #[test]
    fn test_every_error_code_maps_back_to_itself() {
        for err in ALL {
            assert_eq!(PasteboardError::from_code(err.code()), Some(err));
        }
    }

    #[test]
    fn test_error_codes_never_collide_with_ok() {
        assert!(ALL.iter().all(|e| e.code() != E_OK));
        assert_eq!(PasteboardError::from_code(E_OK), None);
    }

    #[test]
    fn test_unknown_code_is_none() {
        assert_eq!(PasteboardError::from_code(9999), None);
    }

    #[test]
    fn test_status_code_for_ok_and_err() {
        assert_eq!(status_code(&Ok(())), E_OK);
        assert_eq!(status_code(&Err(PasteboardError::NoData)), 4);
    }
}
