//! Best-effort classification of opaque backend errors.
//!
//! The document store and its SDK fail with a loose mix of vendor codes
//! (`firestore/permission-denied`), HTTP statuses and free-form messages.
//! [`Classifier`] maps a [`RawError`] onto the fixed [`ErrorKind`] taxonomy
//! by matching codes first and message keywords second. It never fails:
//! anything unrecognised degrades to [`ErrorKind::Unknown`].

use crate::types::ErrorKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// RawError (input)
// ---------------------------------------------------------------------------

/// The narrow input contract of the classifier: an optional machine code and
/// an optional human message, exactly as the backend reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RawError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }

    pub fn from_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: None,
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => write!(f, "{code}: {msg}"),
            (Some(code), None) => f.write_str(code),
            (None, Some(msg)) => f.write_str(msg),
            (None, None) => f.write_str("unknown error"),
        }
    }
}

impl std::error::Error for RawError {}

// ---------------------------------------------------------------------------
// ClassifiedError (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    /// Build a classified error of a known kind. Blank messages fall back to
    /// the kind's default text.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            kind.default_message().to_string()
        } else {
            message
        };
        Self {
            kind,
            message,
            retryable: kind.is_retryable(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

pub struct Rule {
    pub kind: ErrorKind,
    /// Normalized vendor codes (lower-case, kebab, without `service/` prefix).
    pub codes: &'static [&'static str],
    pub statuses: &'static [u16],
    pub keywords: Regex,
}

fn keyword_re(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).unwrap()
}

/// The built-in rule table. Order matters: the first matching rule wins, so
/// terminal kinds are checked before transient ones.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            kind: ErrorKind::PermissionDenied,
            codes: &[
                "permission-denied",
                "unauthenticated",
                "unauthorized",
                "forbidden",
                "requires-recent-login",
                "user-disabled",
            ],
            statuses: &[401, 403],
            keywords: keyword_re(
                r"permission|unauthori[sz]ed|unauthenticated|forbidden|not allowed|insufficient privileges",
            ),
        },
        Rule {
            kind: ErrorKind::InvalidInput,
            codes: &[
                "invalid-argument",
                "failed-precondition",
                "out-of-range",
                "not-found",
                "already-exists",
                "invalid-email",
            ],
            statuses: &[400, 404, 409, 422],
            keywords: keyword_re(
                r"invalid (argument|input|field|value|email|parameter|request)|malformed|bad request|required field|must be|not found|already exists",
            ),
        },
        Rule {
            kind: ErrorKind::RateLimited,
            codes: &["resource-exhausted", "too-many-requests", "quota-exceeded"],
            statuses: &[429],
            keywords: keyword_re(r"rate.?limit|too many requests|quota|resource.exhausted|throttl"),
        },
        Rule {
            kind: ErrorKind::Timeout,
            codes: &["deadline-exceeded", "timeout", "timed-out"],
            statuses: &[408, 504],
            keywords: keyword_re(r"time[ds]?.?out|deadline"),
        },
        Rule {
            kind: ErrorKind::Network,
            codes: &[
                "unavailable",
                "network-request-failed",
                "network-error",
                "offline",
            ],
            statuses: &[502, 503],
            keywords: keyword_re(
                r"network|offline|connection|unreachable|failed to fetch|fetch failed|econn|socket|dns|unavailable",
            ),
        },
    ]
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct Classifier {
    rules: Vec<Rule>,
    /// HTTP status quoted inside a message, e.g. "HTTP 429".
    status_in_message: Regex,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            status_in_message: Regex::new(r"\b[1-5]\d\d\b").unwrap(),
        }
    }

    pub fn classify(&self, raw: &RawError) -> ClassifiedError {
        let kind = self.kind_of(raw);
        ClassifiedError::new(kind, raw.message.clone().unwrap_or_default())
    }

    fn kind_of(&self, raw: &RawError) -> ErrorKind {
        let code = raw.code.as_deref().map(normalize_code);

        // Pass 1: exact codes and HTTP statuses.
        if let Some(code) = code.as_deref() {
            let status = code.parse::<u16>().ok();
            for rule in &self.rules {
                if rule.codes.contains(&code) {
                    return rule.kind;
                }
                if let Some(status) = status {
                    if rule.statuses.contains(&status) {
                        return rule.kind;
                    }
                }
            }
        }

        // Pass 2: statuses quoted in the message.
        if let Some(message) = raw.message.as_deref() {
            for m in self.status_in_message.find_iter(message) {
                let Ok(status) = m.as_str().parse::<u16>() else {
                    continue;
                };
                if let Some(rule) = self.rules.iter().find(|r| r.statuses.contains(&status)) {
                    return rule.kind;
                }
            }
        }

        // Pass 3: keywords over code and message together.
        let haystack = [code.as_deref(), raw.message.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if haystack.trim().is_empty() {
            return ErrorKind::Unknown;
        }
        self.rules
            .iter()
            .find(|rule| rule.keywords.is_match(&haystack))
            .map(|rule| rule.kind)
            .unwrap_or(ErrorKind::Unknown)
    }
}

/// `Firestore/PERMISSION_DENIED` → `permission-denied`.
fn normalize_code(code: &str) -> String {
    let tail = code.rsplit('/').next().unwrap_or(code);
    tail.trim().to_ascii_lowercase().replace('_', "-")
}

static DEFAULT_CLASSIFIER: OnceLock<Classifier> = OnceLock::new();

/// Classify with the built-in rule table.
pub fn classify(raw: &RawError) -> ClassifiedError {
    DEFAULT_CLASSIFIER
        .get_or_init(Classifier::default)
        .classify(raw)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(code: Option<&str>, message: Option<&str>) -> ErrorKind {
        classify(&RawError {
            code: code.map(str::to_string),
            message: message.map(str::to_string),
        })
        .kind
    }

    #[test]
    fn vendor_codes_map_to_kinds() {
        assert_eq!(kind(Some("unavailable"), None), ErrorKind::Network);
        assert_eq!(
            kind(Some("auth/network-request-failed"), None),
            ErrorKind::Network
        );
        assert_eq!(kind(Some("deadline-exceeded"), None), ErrorKind::Timeout);
        assert_eq!(
            kind(Some("resource-exhausted"), None),
            ErrorKind::RateLimited
        );
        assert_eq!(
            kind(Some("firestore/permission-denied"), None),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            kind(Some("invalid-argument"), None),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn upper_snake_codes_are_normalized() {
        assert_eq!(
            kind(Some("PERMISSION_DENIED"), None),
            ErrorKind::PermissionDenied
        );
        assert_eq!(kind(Some("DEADLINE_EXCEEDED"), None), ErrorKind::Timeout);
    }

    #[test]
    fn http_statuses_map_to_kinds() {
        assert_eq!(kind(Some("429"), None), ErrorKind::RateLimited);
        assert_eq!(kind(Some("403"), None), ErrorKind::PermissionDenied);
        assert_eq!(kind(Some("408"), None), ErrorKind::Timeout);
        assert_eq!(kind(Some("504"), None), ErrorKind::Timeout);
        assert_eq!(kind(Some("503"), None), ErrorKind::Network);
        assert_eq!(kind(Some("422"), None), ErrorKind::InvalidInput);
    }

    #[test]
    fn http_statuses_inside_messages_map_to_kinds() {
        assert_eq!(kind(None, Some("HTTP 429")), ErrorKind::RateLimited);
        assert_eq!(
            kind(None, Some("Request failed with status code 503")),
            ErrorKind::Network
        );
        assert_eq!(
            kind(Some("internal"), Some("upstream returned 504")),
            ErrorKind::Timeout
        );
        assert!(classify(&RawError::from_message("HTTP 429")).retryable);
        // Numbers that are not mapped statuses fall through to keywords.
        assert_eq!(
            kind(None, Some("retry 200 of 300: connection reset")),
            ErrorKind::Network
        );
    }

    #[test]
    fn generic_invalid_wording_does_not_mask_network_errors() {
        assert_eq!(
            kind(None, Some("network error: invalid response")),
            ErrorKind::Network
        );
        assert_eq!(
            kind(None, Some("Invalid argument: bio is too long")),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            kind(None, Some("displayName must be a string")),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn code_takes_precedence_over_message() {
        assert_eq!(
            kind(Some("permission-denied"), Some("network hiccup")),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn message_keywords_classify_when_code_is_unknown() {
        assert_eq!(
            kind(Some("internal"), Some("Failed to fetch")),
            ErrorKind::Network
        );
        assert_eq!(kind(None, Some("Request timed out")), ErrorKind::Timeout);
        assert_eq!(
            kind(None, Some("Rate limit exceeded")),
            ErrorKind::RateLimited
        );
        assert_eq!(
            kind(None, Some("Missing or insufficient permissions.")),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn timeout_wins_over_network_in_messages() {
        assert_eq!(
            kind(None, Some("network timeout while saving")),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn unrecognisable_input_degrades_to_unknown() {
        let err = classify(&RawError::default());
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.retryable);
        assert_eq!(err.message, ErrorKind::Unknown.default_message());

        assert_eq!(kind(Some("internal"), Some("boom")), ErrorKind::Unknown);
    }

    #[test]
    fn retryable_flag_follows_kind() {
        assert!(classify(&RawError::from_code("unavailable")).retryable);
        assert!(classify(&RawError::from_code("429")).retryable);
        assert!(!classify(&RawError::from_code("permission-denied")).retryable);
        assert!(!classify(&RawError::from_code("invalid-argument")).retryable);
    }

    #[test]
    fn raw_message_is_preserved() {
        let err = classify(&RawError::new("permission-denied", "permission denied message"));
        assert_eq!(err.message, "permission denied message");
        assert_eq!(err.to_string(), "PERMISSION_DENIED: permission denied message");
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let classifier = Classifier::new(vec![Rule {
            kind: ErrorKind::RateLimited,
            codes: &["slow-down"],
            statuses: &[],
            keywords: keyword_re("calm"),
        }]);
        assert_eq!(
            classifier.classify(&RawError::from_code("slow-down")).kind,
            ErrorKind::RateLimited
        );
        assert_eq!(
            classifier.classify(&RawError::from_code("unavailable")).kind,
            ErrorKind::Unknown
        );
    }
}
