//! Canonical JSON serialization and the protocol's hash formulas.
//!
//! Every hash in the protocol is SHA-256 over a deterministic byte string:
//! either a canonicalized JSON object (the coin digest) or a dash-joined
//! field string (transaction ids and replay hashes).

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::Timestamp;

/// Render a JSON value in its canonical form: sorted object keys, no
/// inter-token whitespace, nulls kept. The result is stable across
/// processes, which is all the digests below need.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

// Streams the canonical rendering into one buffer instead of allocating a
// string per node.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // Digest inputs only ever carry integers, which Number renders
        // without any formatting choices to pin down.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => push_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_escaped(key, out);
                out.push(':');
                if let Some(field) = fields.get(key) {
                    write_canonical(field, out);
                }
            }
            out.push('}');
        }
    }
}

fn push_escaped(text: &str, out: &mut String) {
    match serde_json::to_string(text) {
        Ok(quoted) => out.push_str(&quoted),
        // Serializing a plain string cannot fail; quote bare as a backstop.
        Err(_) => {
            out.push('"');
            out.push_str(text);
            out.push('"');
        }
    }
}

/// SHA-256 hex digest of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The coin integrity digest: SHA-256 over the canonical serialization of
/// the coin's identity, owner, value, timestamps, history length, status,
/// and the hash recorded by the most recent history event.
#[allow(clippy::too_many_arguments)]
pub fn coin_digest(
    id: &str,
    owner_id: &str,
    value: u64,
    created: Timestamp,
    last_transferred: Timestamp,
    history_length: usize,
    status: &str,
    last_history_hash: Option<&str>,
) -> String {
    let body = serde_json::json!({
        "id": id,
        "owner_id": owner_id,
        "value": value,
        "created": created,
        "last_transferred": last_transferred,
        "history_length": history_length,
        "status": status,
        "last_history_hash": last_history_hash,
    });
    sha256_hex(canonicalize(&body).as_bytes())
}

/// Transaction id: SHA-256 of `"{coin_id}-{sender}-{recipient}-{timestamp}"`.
pub fn transaction_id(coin_id: &str, sender: &str, recipient: &str, timestamp: Timestamp) -> String {
    sha256_hex(format!("{coin_id}-{sender}-{recipient}-{timestamp}").as_bytes())
}

/// Replay hash over the full transfer tuple:
/// SHA-256 of `"{coin_id}-{sender}-{recipient}-{signature}-{timestamp}-{value}"`.
/// Resubmitting an identical tuple produces an identical hash.
pub fn replay_hash(
    coin_id: &str,
    sender: &str,
    recipient: &str,
    signature: &str,
    timestamp: Timestamp,
    value: u64,
) -> String {
    sha256_hex(format!("{coin_id}-{sender}-{recipient}-{signature}-{timestamp}-{value}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_nested_object_sorting() {
        let input = json!({"z": 1, "a": {"c": 3, "b": 2}});
        assert_eq!(canonicalize(&input), r#"{"a":{"b":2,"c":3},"z":1}"#);
    }

    #[test]
    fn canonical_null_values_included() {
        let input = json!({"b": null, "a": 1});
        assert_eq!(canonicalize(&input), r#"{"a":1,"b":null}"#);
    }

    #[test]
    fn canonical_arrays_preserved_in_order() {
        let input = json!({"list": [3, 1, 2]});
        assert_eq!(canonicalize(&input), r#"{"list":[3,1,2]}"#);
    }

    #[test]
    fn sha256_hex_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn coin_digest_is_deterministic() {
        let a = coin_digest("c1", "w1", 5, 100, 100, 0, "active", None);
        let b = coin_digest("c1", "w1", 5, 100, 100, 0, "active", None);
        assert_eq!(a, b);
    }

    #[test]
    fn coin_digest_sensitive_to_every_field() {
        let base = coin_digest("c1", "w1", 5, 100, 100, 0, "active", None);
        assert_ne!(base, coin_digest("c2", "w1", 5, 100, 100, 0, "active", None));
        assert_ne!(base, coin_digest("c1", "w2", 5, 100, 100, 0, "active", None));
        assert_ne!(base, coin_digest("c1", "w1", 6, 100, 100, 0, "active", None));
        assert_ne!(base, coin_digest("c1", "w1", 5, 101, 100, 0, "active", None));
        assert_ne!(base, coin_digest("c1", "w1", 5, 100, 101, 0, "active", None));
        assert_ne!(base, coin_digest("c1", "w1", 5, 100, 100, 1, "active", None));
        assert_ne!(base, coin_digest("c1", "w1", 5, 100, 100, 0, "spent", None));
        assert_ne!(
            base,
            coin_digest("c1", "w1", 5, 100, 100, 0, "active", Some("abc"))
        );
    }

    #[test]
    fn transaction_id_matches_formula() {
        let id = transaction_id("c1", "s1", "r1", 42);
        assert_eq!(id, sha256_hex(b"c1-s1-r1-42"));
    }

    #[test]
    fn replay_hash_changes_with_signature() {
        let a = replay_hash("c1", "s1", "r1", "sigA", 42, 5);
        let b = replay_hash("c1", "s1", "r1", "sigB", 42, 5);
        assert_ne!(a, b);
    }
}
