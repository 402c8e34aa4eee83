//! Canonical JSON encoding and message signing.
//!
//! A relay verifies signatures over a byte-exact serialization, so both
//! sides must agree on one. Standard JSON libraries do not guarantee key
//! order; the canonical form fixes that:
//!
//!   - objects emit keys in ascending lexicographic byte order
//!   - arrays preserve element order
//!   - scalars use their standard compact JSON encoding
//!   - no whitespace anywhere
//!
//! The `signature` key itself is excluded from the signed bytes, so a
//! message can be verified regardless of whether the signature slot was
//! already present when it was assembled.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::Value;

/// Key excluded from the signed byte representation.
const SIGNATURE_KEY: &str = "signature";

/// Render `value` in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys are JSON strings; Value::String reuses the standard
                // escaping rules.
                write_canonical(out, &Value::String((*key).clone()));
                out.push(':');
                write_canonical(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // Null, Bool, Number, String: serde_json's Display is already the
        // compact standard encoding.
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Canonical form of `value` with any top-level `signature` key removed.
/// These are the exact bytes covered by [`sign_value`] / [`verify_value`].
pub fn signing_bytes(value: &Value) -> String {
    match value {
        Value::Object(map) if map.contains_key(SIGNATURE_KEY) => {
            let mut stripped = map.clone();
            stripped.remove(SIGNATURE_KEY);
            canonical_json(&Value::Object(stripped))
        }
        _ => canonical_json(value),
    }
}

/// Sign `value` and return the base58-encoded Ed25519 signature.
pub fn sign_value(key: &SigningKey, value: &Value) -> String {
    let bytes = signing_bytes(value);
    let sig: Signature = key.sign(bytes.as_bytes());
    bs58::encode(sig.to_bytes()).into_string()
}

/// Verify a base58 signature over the canonical form of `value`
/// (with `signature` removed).
pub fn verify_value(key: &VerifyingKey, value: &Value, signature_b58: &str) -> bool {
    let Ok(sig_bytes) = bs58::decode(signature_b58).into_vec() else {
        return false;
    };
    let sig_arr: [u8; 64] = match sig_bytes.try_into() {
        Ok(arr) => arr,
        Err(_) => return false,
    };
    let sig = Signature::from_bytes(&sig_arr);
    let bytes = signing_bytes(value);
    key.verify(bytes.as_bytes(), &sig).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
