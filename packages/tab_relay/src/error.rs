//! Relay error taxonomy and wire error codes.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("session role does not permit this call")]
    Unauthorized,

    #[error("tab is not live: {0}")]
    UnknownTab(String),

    #[error("no live tabs for this account")]
    NoLiveTabs,

    #[error("account must be a non-empty string")]
    InvalidAccount,
}

impl RelayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::UnknownTab(_) => "unknown_tab",
            Self::NoLiveTabs => "no_live_tabs",
            Self::InvalidAccount => "invalid_account",
        }
    }
}
