//! Bearer checks for the scheduler and internal tools, plus agreement tokens.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::errors::AppError;

/// Bytes of entropy in an agreement token (hex-encoded to 64 chars).
pub const AGREEMENT_TOKEN_BYTES: usize = 32;

/// Fresh single-use agreement token.
pub fn generate_agreement_token() -> String {
    let mut bytes = [0u8; AGREEMENT_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compares two secrets without leaking where they differ.
///
/// Both sides are hashed first so the comparison always runs over 32 bytes,
/// independent of the provided length.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Scheduler guard. With no secret configured every caller is let through
/// (a warning was already logged at startup).
pub fn validate_cron_secret(expected: Option<&str>, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    if !secrets_match(token, expected) {
        tracing::warn!("Invalid cron secret received");
        return Err(AppError::Unauthorized("Invalid cron secret".to_string()));
    }

    Ok(())
}

/// Internal-tool guard. Fails closed: without a configured key nothing passes.
pub fn validate_admin_key(expected: Option<&str>, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Err(AppError::Unauthorized(
            "ADMIN_API_KEY is not configured".to_string(),
        ));
    };

    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    if !secrets_match(token, expected) {
        tracing::warn!("Invalid admin key received");
        return Err(AppError::Unauthorized("Invalid admin key".to_string()));
    }

    Ok(())
}
