// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data for attack simulation.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::net::{IpAddr, Ipv4Addr};

/// Pool of distinct client addresses in 10.0.0.0/8.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Webhook body with the given event type.
pub fn event_body(event_type: &str, n: usize) -> String {
    serde_json::json!({ "type": event_type, "sequence": n }).to_string()
}

/// Signatures an attacker might try for `body`, given the genuine one.
///
/// None of these may be accepted.
pub fn forged_signatures(genuine: &str, body: &str) -> Vec<(String, Option<String>)> {
    let mut flipped = genuine.as_bytes().to_vec();
    flipped[0] = if flipped[0] == b'A' { b'B' } else { b'A' };

    let raw = STANDARD.decode(genuine).unwrap_or_default();
    let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();

    let other_body = format!("{body} ");
    let other = edge_gateway::signature::sign(other_body.as_bytes(), b"whsec_test_secret").unwrap_or_default();
    let wrong_key = edge_gateway::signature::sign(body.as_bytes(), b"guessed-secret").unwrap_or_default();

    vec![
        ("missing".into(), None),
        ("empty".into(), Some(String::new())),
        ("whitespace".into(), Some("   ".into())),
        ("flipped first char".into(), Some(String::from_utf8(flipped).unwrap_or_default())),
        ("truncated".into(), Some(genuine[..genuine.len() - 4].to_string())),
        ("extended".into(), Some(format!("{genuine}AAAA"))),
        ("hex encoded".into(), Some(hex)),
        ("signature of other body".into(), Some(other)),
        ("wrong secret".into(), Some(wrong_key)),
        ("prefix only".into(), Some("sha256=".into())),
        ("lowercased".into(), Some(genuine.to_lowercase())),
    ]
}

/// Event types that try to escape the storage key layout.
pub fn hostile_event_types() -> Vec<&'static str> {
    vec![
        "../../../etc/passwd",
        "..",
        "a/../../b",
        "..\\..\\windows",
        "evil\u{0000}null",
        "spaces and/slashes",
        "",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_forgeries_differ_from_genuine() {
        let body = event_body("test", 1);
        let genuine = edge_gateway::signature::sign(body.as_bytes(), b"whsec_test_secret").unwrap();
        for (name, forged) in forged_signatures(&genuine, &body) {
            assert_ne!(forged.as_deref(), Some(genuine.as_str()), "{name}");
        }
    }
}
