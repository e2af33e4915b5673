// src/source_error.rs

use reqwest::StatusCode;

/// Why a balance source could not produce a structured result.
///
/// Every variant means "unavailable" to the cascade; the kind only matters for logs and
/// metrics.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Transport error ({source_name}): {message}")]
    Transport {
        source_name: &'static str,
        message: String,
    },
    #[error("Authentication rejected by {0}")]
    Auth(&'static str),
    #[error("Unexpected response from {source_name}: {message}")]
    Protocol {
        source_name: &'static str,
        message: String,
    },
    #[error("Rate limited by {0}")]
    RateLimited(&'static str),
    #[error("Address not found at {0}")]
    NotFound(&'static str),
    #[error("Contract violation calling {source_name}: {message}")]
    Contract {
        source_name: &'static str,
        message: String,
    },
}

impl SourceError {
    pub fn transport(source_name: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            source_name,
            message: err.to_string(),
        }
    }

    pub fn protocol(source_name: &'static str, message: impl Into<String>) -> Self {
        Self::Protocol {
            source_name,
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status to an error kind.
    pub fn from_status(source_name: &'static str, status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth(source_name),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(source_name),
            StatusCode::NOT_FOUND => Self::NotFound(source_name),
            other => Self::protocol(source_name, format!("HTTP {}", other.as_u16())),
        }
    }

    /// Short kind name for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Auth(_) => "auth",
            Self::Protocol { .. } => "protocol",
            Self::RateLimited(_) => "rate_limited",
            Self::NotFound(_) => "not_found",
            Self::Contract { .. } => "contract",
        }
    }
}
