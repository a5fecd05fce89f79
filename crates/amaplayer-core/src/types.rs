use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Timeout,
    InvalidInput,
    RateLimited,
    PermissionDenied,
    Unknown,
}

impl ErrorKind {
    pub fn all() -> &'static [ErrorKind] {
        &[
            ErrorKind::Network,
            ErrorKind::Timeout,
            ErrorKind::InvalidInput,
            ErrorKind::RateLimited,
            ErrorKind::PermissionDenied,
            ErrorKind::Unknown,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Transient kinds are retried by the scheduler; everything else is
    /// surfaced on the first failure. `Unknown` is deliberately terminal.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimited
        )
    }

    /// User-facing text used when the backend supplied no message.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error. Check your connection and try again.",
            ErrorKind::Timeout => "The request timed out. Please try again.",
            ErrorKind::InvalidInput => "The request was invalid.",
            ErrorKind::RateLimited => "Too many requests. Please wait a moment.",
            ErrorKind::PermissionDenied => "You don't have permission to do that.",
            ErrorKind::Unknown => "Something went wrong.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = crate::error::AmaError;

    /// Accepts the canonical upper-case names as well as lower/kebab-case
    /// spellings (`network`, `rate-limited`, `permission_denied`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ErrorKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| crate::error::AmaError::InvalidErrorKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Athlete,
    Coach,
    Organization,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Athlete => "athlete",
            Role::Coach => "coach",
            Role::Organization => "organization",
            Role::Parent => "parent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::AmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "athlete" => Ok(Role::Athlete),
            "coach" => Ok(Role::Coach),
            "organization" => Ok(Role::Organization),
            "parent" => Ok(Role::Parent),
            _ => Err(crate::error::AmaError::InvalidRole(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// SortOrder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Alphabetical by display name.
    #[default]
    Name,
    Newest,
    Followers,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Name => "name",
            SortOrder::Newest => "newest",
            SortOrder::Followers => "followers",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortOrder {
    type Err = crate::error::AmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortOrder::Name),
            "newest" => Ok(SortOrder::Newest),
            "followers" => Ok(SortOrder::Followers),
            _ => Err(crate::error::AmaError::InvalidSort(s.to_string())),
        }
    }
}
