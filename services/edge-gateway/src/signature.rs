// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HMAC-SHA256 webhook signature verification.
//!
//! Senders sign the exact request body bytes and send the MAC base64
//! encoded. Verification runs over the raw body before any parsing, and
//! the final comparison is constant-time.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Optional prefix some senders put in front of the encoded MAC.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Sign `body` with `secret`, returning the base64-encoded MAC.
///
/// Returns `None` only if the MAC cannot be keyed.
pub fn sign(body: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check `provided` against the MAC of `body` under `secret`.
///
/// A missing or empty secret or signature is a failed verification.
pub fn verify(body: &[u8], secret: Option<&[u8]>, provided: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        debug!("No shared secret configured");
        return false;
    };
    let Some(provided) = provided.map(str::trim).filter(|s| !s.is_empty()) else {
        debug!("Signature header missing or empty");
        return false;
    };
    let provided = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);

    let Some(expected) = sign(body, secret) else {
        return false;
    };

    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}

/// Byte comparison whose timing does not depend on where the inputs differ.
///
/// Inputs of different length compare unequal; the length of a MAC
/// encoding is public, so only the contents need protecting.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
