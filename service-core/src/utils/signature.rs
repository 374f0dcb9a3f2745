use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age, in seconds, of a signed webhook delivery.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("no signature matched the payload")]
    Mismatch,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// HMAC-SHA256 over `"{timestamp}.{payload}"`, hex encoded.
pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Builds a header of the form `t=<timestamp>,v1=<signature>`.
pub fn signature_header(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, signature))
}

/// Verifies a `t=...,v1=...` header. Any one of several `v1` entries may
/// match; other schemes are ignored.
pub fn verify_signature_header(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: i64,
    tolerance_seconds: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                )
            }
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let expected = compute_signature(secret, timestamp, payload)?;
    let expected_bytes = expected.as_bytes();
    let matched = candidates.iter().any(|candidate| {
        let candidate = candidate.as_bytes();
        candidate.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(candidate))
    });

    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if tolerance_seconds > 0 && (now - timestamp).abs() > tolerance_seconds {
        return Err(SignatureError::Expired);
    }

    Ok(())
}
