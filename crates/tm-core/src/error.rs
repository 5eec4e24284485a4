use thiserror::Error;

use crate::site::SiteId;

/// Coarse classification every [`TmError`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    InvalidSiteAccess,
    StateReuse,
    Host,
}

#[derive(Debug, Error)]
pub enum TmError {
    #[error("force-pass is active but the pass/fail flags were not initialized for this cycle")]
    FlagsNotInitialized,
    #[error("missing required parameter `{name}`")]
    MissingParameter { name: String },
    #[error("parameter `{name}` was supplied but is not declared by the test method")]
    UnknownParameter { name: String },
    #[error("`{operation}` is not allowed while the test method is {state}")]
    OutOfOrder {
        operation: &'static str,
        state: &'static str,
    },
    #[error("site {site} is not part of the active site set")]
    InvalidSiteAccess { site: SiteId },
    #[error("force-pass state belongs to cycle {found}, current cycle is {expected}")]
    StateReuse { expected: u64, found: u64 },
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl TmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FlagsNotInitialized
            | Self::MissingParameter { .. }
            | Self::UnknownParameter { .. }
            | Self::OutOfOrder { .. } => ErrorCategory::Configuration,
            Self::InvalidSiteAccess { .. } => ErrorCategory::InvalidSiteAccess,
            Self::StateReuse { .. } => ErrorCategory::StateReuse,
            Self::Host(_) => ErrorCategory::Host,
        }
    }

    pub fn stable_code(&self) -> &'static str {
        match self {
            Self::FlagsNotInitialized => "flags_not_initialized",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::UnknownParameter { .. } => "unknown_parameter",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::InvalidSiteAccess { .. } => "invalid_site_access",
            Self::StateReuse { .. } => "state_reuse",
            Self::Host(_) => "host_failure",
        }
    }
}

pub type Result<T, E = TmError> = std::result::Result<T, E>;
