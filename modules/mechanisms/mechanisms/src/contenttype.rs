//! Response decoders selected by `Content-Type`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use mechanisms_sdk::MechanismError;

/// Turns a response body into a structured value.
pub trait Decoder: Send + Sync {
    /// # Errors
    /// Returns [`MechanismError::Internal`] if the body does not match the
    /// decoder's format.
    fn decode(&self, body: &[u8]) -> Result<Value, MechanismError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value, MechanismError> {
        serde_json::from_slice(body)
            .map_err(|e| MechanismError::Internal(format!("failed to unmarshal json response: {e}")))
    }
}

/// Decodes `a=1&b=2&b=3` into `{"a": "1", "b": ["2", "3"]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormDecoder;

impl Decoder for FormDecoder {
    fn decode(&self, body: &[u8]) -> Result<Value, MechanismError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| MechanismError::Internal(format!("failed to unmarshal form response: {e}")))?;

        let mut result = Map::new();
        for (key, value) in pairs {
            match result.get_mut(&key) {
                None => {
                    result.insert(key, Value::String(value));
                }
                Some(Value::Array(values)) => values.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
            }
        }
        Ok(Value::Object(result))
    }
}

/// Decoders keyed by normalized media type (`type/subtype`, lowercase, no
/// parameters). Media types with a `+json` suffix fall back to the JSON
/// decoder.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn Decoder>>,
    json: Arc<dyn Decoder>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        let json: Arc<dyn Decoder> = Arc::new(JsonDecoder);
        let mut registry = Self {
            decoders: HashMap::new(),
            json: Arc::clone(&json),
        };
        registry.register(mime::APPLICATION_JSON.essence_str(), json);
        registry.register(
            mime::APPLICATION_WWW_FORM_URLENCODED.essence_str(),
            Arc::new(FormDecoder),
        );
        registry
    }
}

impl DecoderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, media_type: &str, decoder: Arc<dyn Decoder>) {
        self.decoders.insert(media_type.to_ascii_lowercase(), decoder);
    }

    /// Looks up the decoder for a raw `Content-Type` header value.
    #[must_use]
    pub fn decoder_for(&self, content_type: &str) -> Option<&dyn Decoder> {
        let parsed: mime::Mime = content_type.trim().parse().ok()?;
        let essence = parsed.essence_str().to_ascii_lowercase();

        if let Some(decoder) = self.decoders.get(&essence) {
            return Some(decoder.as_ref());
        }
        (parsed.suffix() == Some(mime::JSON)).then_some(self.json.as_ref())
    }
}
