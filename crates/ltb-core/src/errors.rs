use std::path::PathBuf;

/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so the transport can
/// pick a user-facing message by kind (actionable configuration problem vs opaque
/// downstream failure) without inspecting message text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("backend error: {0}")]
    Backend(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// True for failures the user can fix by changing settings or input.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidPath { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actionable_kinds() {
        assert!(Error::Config("no model".into()).is_user_actionable());
        assert!(Error::InvalidPath {
            path: PathBuf::from("/tmp/x.txt"),
            reason: "not an image".into(),
        }
        .is_user_actionable());
        assert!(!Error::Backend("401 unauthorized".into()).is_user_actionable());
        assert!(!Error::Storage("locked".into()).is_user_actionable());
    }
}
