//! Webhook authentication and input-sanitization utilities.
//!
//! Signature verification follows the Slack signing scheme:
//!
//! 1. The platform sends `X-Slack-Signature: v0=<hmac>` and
//!    `X-Slack-Request-Timestamp: <unix_ts>`.
//! 2. We compute `HMAC-SHA256(secret, "v0:" + timestamp + ":" + body)` over
//!    the exact raw request bytes.
//! 3. We compare in constant time (`subtle::ConstantTimeEq`).
//! 4. Requests whose timestamp is more than 5 minutes from now are rejected
//!    before the signature is even checked (replay protection).
//!
//! Failures emit a structured security-event log entry with masked
//! identifiers and never include the secret or the request body.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::command::Platform;

/// Signature version prefix used in the signing basestring.
pub const SIGNATURE_VERSION: &str = "v0";

/// Maximum allowed clock skew between the request timestamp and now.
pub const REPLAY_WINDOW_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("signature header missing")]
    MissingSignature,
    #[error("timestamp header missing")]
    MissingTimestamp,
    #[error("timestamp is not an integer")]
    InvalidTimestamp,
    #[error("request timestamp outside the replay window")]
    StaleTimestamp,
    #[error("HMAC signature does not match")]
    SignatureMismatch,
    #[error("internal HMAC error")]
    Internal,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Compute the `v0=<hex>` signature for the given secret, timestamp and body.
pub fn compute_signature(secret: &[u8], timestamp: &str, body: &[u8]) -> Result<String, VerifyError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| VerifyError::Internal)?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Ok(format!(
        "{}={}",
        SIGNATURE_VERSION,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a webhook signature against the raw request body.
///
/// Headers are passed as options so that absence is an explicit rejection,
/// not a panic or an empty-string comparison.
pub fn verify_signature(
    secret: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), VerifyError> {
    verify_signature_at(secret, timestamp, signature, body, now_secs())
}

/// [`verify_signature`] with an injectable clock, for tests and replays.
pub fn verify_signature_at(
    secret: &[u8],
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), VerifyError> {
    let timestamp = timestamp.ok_or(VerifyError::MissingTimestamp)?;
    let signature = signature.ok_or(VerifyError::MissingSignature)?;

    // Replay guard comes first: a stale request is rejected even when its
    // signature is otherwise correct.
    let ts: i64 = timestamp.parse().map_err(|_| VerifyError::InvalidTimestamp)?;
    if (now - ts).unsigned_abs() > REPLAY_WINDOW_SECS as u64 {
        return Err(VerifyError::StaleTimestamp);
    }

    let expected = compute_signature(secret, timestamp, body)?;
    if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        Ok(())
    } else {
        Err(VerifyError::SignatureMismatch)
    }
}

/// Mask an identifier for log output, keeping a short recognizable prefix.
pub fn mask_id(id: &str) -> String {
    let prefix: String = id.chars().take(3).collect();
    if id.chars().count() <= 3 {
        prefix
    } else {
        format!("{prefix}***")
    }
}

/// Emit a structured security-event log entry.
///
/// No secrets, raw bodies, or message content; identifiers are masked.
pub fn log_security_event(kind: &str, platform: Platform, user_id: Option<&str>) {
    warn!(
        event_type = "security_event",
        security_event = kind,
        platform = platform.as_str(),
        user_id = user_id.map(mask_id).as_deref().unwrap_or("-"),
        "security event"
    );
}

/// Log a created recognition without its message content.
pub fn log_recognition(
    platform: Platform,
    actor_id: &str,
    recipient_id: &str,
    points: Option<u32>,
    ai_enhanced: bool,
    message_len: usize,
) {
    tracing::info!(
        event_type = "recognition_created",
        platform = platform.as_str(),
        actor = %mask_id(actor_id),
        recipient = %mask_id(recipient_id),
        points = points.unwrap_or(0),
        ai_enhanced,
        message_len,
        "recognition created"
    );
}

// ── Input sanitization ────────────────────────────────────────────────────────

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static HTML_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static SQL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|EXEC|EXECUTE)\b").unwrap()
});
static SQL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[;'"\\]"#).unwrap());
static SQL_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"--|/\*|\*/|\*\*").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Default maximum length for recognition messages.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Sanitize free-text user input before it is stored or forwarded upstream.
///
/// Strips HTML/script tags and common SQL-injection patterns, clamps the
/// length, and normalizes whitespace.
pub fn sanitize_message(input: &str, max_len: usize) -> String {
    let mut sanitized = SCRIPT_TAGS.replace_all(input, "").into_owned();
    sanitized = HTML_TAGS.replace_all(&sanitized, "").into_owned();
    sanitized = SQL_KEYWORDS.replace_all(&sanitized, "").into_owned();
    sanitized = SQL_CHARS.replace_all(&sanitized, "").into_owned();
    sanitized = SQL_COMMENTS.replace_all(&sanitized, "").into_owned();

    if sanitized.chars().count() > max_len {
        let truncated: String = sanitized.chars().take(max_len).collect();
        sanitized = format!("{truncated}...");
    }

    WHITESPACE_RUNS
        .replace_all(sanitized.trim(), " ")
        .into_owned()
}

static SLACK_MENTION_EXACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<@([A-Z0-9]+)>$").unwrap());
static TEAMS_MENTION_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<at>([^<>]+)</at>$").unwrap());
static BARE_USER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

/// Validate a user mention and extract the bare user ID.
///
/// Accepts `<@U123>`, `<at>id</at>` or an already-bare alphanumeric ID.
pub fn sanitize_user_mention(mention: &str) -> Option<String> {
    if let Some(caps) = SLACK_MENTION_EXACT.captures(mention) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = TEAMS_MENTION_EXACT.captures(mention) {
        return Some(caps[1].to_string());
    }
    if BARE_USER_ID.is_match(mention) {
        return Some(mention.to_string());
    }
    None
}

/// Inclusive points bound enforced before any upstream call.
pub const MAX_POINTS: i64 = 10_000;

/// Validate a requester-chosen point amount: integral, within 0..=10000.
pub fn validate_points(points: i64) -> Option<u32> {
    if (0..=MAX_POINTS).contains(&points) {
        Some(points as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";

    fn recent_ts() -> String {
        now_secs().to_string()
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let ts = recent_ts();
        let body = b"command=%2Fthanks&text=%3C%40U42%3E+nice";
        let sig = compute_signature(SECRET, &ts, body).unwrap();
        assert!(verify_signature(SECRET, Some(&ts), Some(&sig), body).is_ok());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let ts = recent_ts();
        let sig = compute_signature(SECRET, &ts, b"original").unwrap();
        let result = verify_signature(SECRET, Some(&ts), Some(&sig), b"originam");
        assert_eq!(result, Err(VerifyError::SignatureMismatch));
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let ts = recent_ts();
        let body = b"body";
        let sig = compute_signature(SECRET, &ts, body).unwrap();
        let tampered = if sig.ends_with('0') {
            format!("{}1", &sig[..sig.len() - 1])
        } else {
            format!("{}0", &sig[..sig.len() - 1])
        };
        let result = verify_signature(SECRET, Some(&ts), Some(&tampered), body);
        assert_eq!(result, Err(VerifyError::SignatureMismatch));
    }

    #[test]
    fn test_tampered_timestamp_is_rejected() {
        let now = 1_700_000_000i64;
        let ts = now.to_string();
        let body = b"body";
        let sig = compute_signature(SECRET, &ts, body).unwrap();
        let other_ts = (now + 1).to_string();
        let result = verify_signature_at(SECRET, Some(&other_ts), Some(&sig), body, now);
        assert_eq!(result, Err(VerifyError::SignatureMismatch));
    }

    #[test]
    fn test_missing_headers_are_rejected() {
        let ts = recent_ts();
        let body = b"body";
        let sig = compute_signature(SECRET, &ts, body).unwrap();
        assert_eq!(
            verify_signature(SECRET, None, Some(&sig), body),
            Err(VerifyError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(SECRET, Some(&ts), None, body),
            Err(VerifyError::MissingSignature)
        );
    }

    #[test]
    fn test_stale_timestamp_rejected_past_and_future() {
        let now = 1_700_000_000i64;
        let body = b"body";

        let old = (now - REPLAY_WINDOW_SECS - 1).to_string();
        let sig = compute_signature(SECRET, &old, body).unwrap();
        assert_eq!(
            verify_signature_at(SECRET, Some(&old), Some(&sig), body, now),
            Err(VerifyError::StaleTimestamp)
        );

        let future = (now + REPLAY_WINDOW_SECS + 1).to_string();
        let sig = compute_signature(SECRET, &future, body).unwrap();
        assert_eq!(
            verify_signature_at(SECRET, Some(&future), Some(&sig), body, now),
            Err(VerifyError::StaleTimestamp)
        );
    }

    #[test]
    fn test_edge_of_replay_window_is_accepted() {
        let now = 1_700_000_000i64;
        let body = b"body";
        let edge = (now - REPLAY_WINDOW_SECS).to_string();
        let sig = compute_signature(SECRET, &edge, body).unwrap();
        assert!(verify_signature_at(SECRET, Some(&edge), Some(&sig), body, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let ts = recent_ts();
        let body = b"body";
        let sig = compute_signature(b"other-secret", &ts, body).unwrap();
        assert_eq!(
            verify_signature(SECRET, Some(&ts), Some(&sig), body),
            Err(VerifyError::SignatureMismatch)
        );
    }

    #[test]
    fn test_non_numeric_timestamp_is_rejected() {
        let result = verify_signature(SECRET, Some("not-a-number"), Some("v0=00"), b"body");
        assert_eq!(result, Err(VerifyError::InvalidTimestamp));
    }

    #[test]
    fn test_sanitize_strips_tags_and_sql() {
        let out = sanitize_message("<script>alert(1)</script>DROP TABLE users; <b>hi</b>", 500);
        assert!(!out.contains("script"));
        assert!(!out.to_lowercase().contains("drop"));
        assert!(!out.contains(';'));
        assert!(out.contains("hi"));
    }

    #[test]
    fn test_sanitize_preserves_plain_message() {
        assert_eq!(sanitize_message("Great job!", 500), "Great job!");
    }

    #[test]
    fn test_sanitize_clamps_length() {
        let long = "a".repeat(600);
        let out = sanitize_message(&long, 500);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 503);
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_message("  hello   world  ", 500), "hello world");
    }

    #[test]
    fn test_mention_forms() {
        assert_eq!(sanitize_user_mention("<@U1234>").as_deref(), Some("U1234"));
        assert_eq!(
            sanitize_user_mention("<at>jane.doe</at>").as_deref(),
            Some("jane.doe")
        );
        assert_eq!(sanitize_user_mention("emp_001").as_deref(), Some("emp_001"));
        assert_eq!(sanitize_user_mention("<bogus>"), None);
        assert_eq!(sanitize_user_mention(""), None);
    }

    #[test]
    fn test_points_bounds() {
        assert_eq!(validate_points(0), Some(0));
        assert_eq!(validate_points(10_000), Some(10_000));
        assert_eq!(validate_points(10_001), None);
        assert_eq!(validate_points(-1), None);
    }

    #[test]
    fn test_mask_id() {
        assert_eq!(mask_id("U1234567"), "U12***");
        assert_eq!(mask_id("U1"), "U1");
    }
}
