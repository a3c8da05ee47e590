use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unexpected filename format: {0}")]
    Format(String),
    #[error("invalid argument: {0}")]
    Validation(String),
    #[error("transfer backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("transfer backend failed: {0}")]
    Backend(String),
    #[error("not implemented by the {backend} backend: {operation}")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorCode {
    E001Locked,
    E002ConfigInvalid,
    E003BackendUnavailable,
    E004BackendFailed,
    E005CwdInvalid,
}

impl ArchiveErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002ConfigInvalid => "E002_CONFIG_INVALID",
            Self::E003BackendUnavailable => "E003_BACKEND_UNAVAILABLE",
            Self::E004BackendFailed => "E004_BACKEND_FAILED",
            Self::E005CwdInvalid => "E005_CWD_INVALID",
        }
    }

    /// Best-effort mapping from a propagated error to an operator code.
    pub fn classify(err: &anyhow::Error) -> Option<Self> {
        match err.downcast_ref::<ArchiveError>()? {
            ArchiveError::BackendUnavailable(_) => Some(Self::E003BackendUnavailable),
            ArchiveError::Backend(_) => Some(Self::E004BackendFailed),
            _ => None,
        }
    }
}
