//! HMAC signing of job events so the job runner can trust what it executes.

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::{EventBusError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Field holding the hex signature inside a signed event.
pub const SIGNATURE_FIELD: &str = "mediawiki_signature";

/// Sign an event: HMAC-SHA256 over its canonical JSON without the signature field.
pub fn sign_event(event: &Value, secret: &str) -> Result<String> {
    let payload = signing_payload(event)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| EventBusError::Signature(e.to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Insert the signature field into an event object.
pub fn attach_signature(event: &mut Value, secret: &str) -> Result<()> {
    let signature = sign_event(event, secret)?;
    match event.as_object_mut() {
        Some(map) => {
            map.insert(SIGNATURE_FIELD.to_string(), Value::String(signature));
            Ok(())
        }
        None => Err(EventBusError::Signature("event is not an object".into())),
    }
}

/// Check the embedded signature.
pub fn verify_event_signature(event: &Value, secret: &str) -> Result<()> {
    if secret.is_empty() {
        return Err(EventBusError::Signature("no signing secret configured".into()));
    }
    let provided = event
        .get(SIGNATURE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| EventBusError::Signature("missing signature".into()))?;

    let expected = sign_event(event, secret)?;
    if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(EventBusError::Signature("signature mismatch".into()))
    }
}

fn signing_payload(event: &Value) -> Result<String> {
    let mut unsigned = canonical(event);
    if let Some(map) = unsigned.as_object_mut() {
        map.remove(SIGNATURE_FIELD);
    }
    Ok(serde_json::to_string(&unsigned)?)
}

/// Copy with object keys in sorted order at every level.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
