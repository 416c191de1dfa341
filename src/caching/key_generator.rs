//! # Cache Key Generator
//!
//! Derives canonical cache keys from request descriptors.
//!
//! A [`CacheKey`] keeps the method and resource verbatim and replaces the
//! payload with the SHA-256 digest of its canonical JSON form (object keys
//! sorted recursively, no whitespace). Two descriptors therefore map to the
//! same key exactly when their method, resource and payload content agree,
//! independent of the order in which payload fields were inserted.

use crate::core::error::{CacheError, CacheResult};
use crate::core::types::RequestDescriptor;
use http::Method;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical identifier of a (method, resource, payload) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    method: String,
    resource: String,
    digest: String,
}

impl CacheKey {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Hex encoded SHA-256 of the canonical payload
    pub fn payload_digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.digest.get(..12).unwrap_or(&self.digest);
        write!(f, "{} {} #{}", self.method, self.resource, short)
    }
}

/// Compute the key for a triple
///
/// Pure and total: no validation happens here, see [`DefaultKeyGenerator`]
/// for the checks applied by the cache.
pub fn compute_key(method: &Method, resource: &str, payload: &Value) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(payload).as_bytes());

    CacheKey {
        method: method.as_str().to_string(),
        resource: resource.to_string(),
        digest: hex::encode(hasher.finalize()),
    }
}

/// Serialize a JSON value with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Cache key generator trait
///
/// Implementations must be deterministic and injective over the
/// descriptor's method, resource and payload content.
pub trait KeyGenerator: Send + Sync {
    /// Generate a cache key for a request descriptor
    fn generate_key(&self, request: &RequestDescriptor) -> CacheResult<CacheKey>;
}

/// Default key generator implementation
#[derive(Debug, Clone)]
pub struct DefaultKeyGenerator {
    max_resource_length: usize,
}

impl Default for DefaultKeyGenerator {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl DefaultKeyGenerator {
    /// Create a new key generator with a resource length limit
    pub fn new(max_resource_length: usize) -> Self {
        Self { max_resource_length }
    }

    fn validate(&self, request: &RequestDescriptor) -> CacheResult<()> {
        if request.resource.is_empty() {
            return Err(CacheError::key_generation("Resource identifier cannot be empty"));
        }

        if request.resource.len() > self.max_resource_length {
            return Err(CacheError::key_generation(format!(
                "Resource length {} exceeds maximum {}",
                request.resource.len(),
                self.max_resource_length
            )));
        }

        Ok(())
    }
}

impl KeyGenerator for DefaultKeyGenerator {
    fn generate_key(&self, request: &RequestDescriptor) -> CacheResult<CacheKey> {
        self.validate(request)?;
        Ok(compute_key(&request.method, &request.resource, &request.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_deterministic() {
        let a = compute_key(&Method::GET, "/api/users", &json!({"page": 1}));
        let b = compute_key(&Method::GET, "/api/users", &json!({"page": 1}));
        assert_eq!(a, b);
        assert_eq!(a.payload_digest().len(), 64);
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let mut first = serde_json::Map::new();
        first.insert("b".to_string(), json!(2));
        first.insert("a".to_string(), json!({"y": [1, 2], "x": null}));

        let mut second = serde_json::Map::new();
        second.insert("a".to_string(), json!({"x": null, "y": [1, 2]}));
        second.insert("b".to_string(), json!(2));

        assert_eq!(
            canonical_json(&Value::Object(first.clone())),
            r#"{"a":{"x":null,"y":[1,2]},"b":2}"#
        );
        assert_eq!(
            compute_key(&Method::POST, "/search", &Value::Object(first)),
            compute_key(&Method::POST, "/search", &Value::Object(second)),
        );
    }

    #[test]
    fn test_any_component_changes_the_key() {
        let base = compute_key(&Method::GET, "/api/users", &json!({"page": 1}));

        assert_ne!(base, compute_key(&Method::POST, "/api/users", &json!({"page": 1})));
        assert_ne!(base, compute_key(&Method::GET, "/api/user", &json!({"page": 1})));
        assert_ne!(base, compute_key(&Method::GET, "/api/users", &json!({"page": 2})));
        assert_ne!(base, compute_key(&Method::GET, "/api/users", &json!({"page": "1"})));
        assert_ne!(base, compute_key(&Method::GET, "/api/users", &json!([{"page": 1}])));
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(
            compute_key(&Method::GET, "/ids", &json!([1, 2])),
            compute_key(&Method::GET, "/ids", &json!([2, 1])),
        );
    }

    #[test]
    fn test_separator_characters_stay_distinct() {
        // Components are kept apart structurally, not by string concatenation
        assert_ne!(
            compute_key(&Method::GET, "a:b", &Value::Null),
            compute_key(&Method::GET, "a", &json!("b")),
        );
    }

    #[test]
    fn test_generator_validation() {
        let generator = DefaultKeyGenerator::new(10);

        let empty = RequestDescriptor::get("");
        assert!(matches!(
            generator.generate_key(&empty),
            Err(CacheError::KeyGeneration { .. })
        ));

        let long = RequestDescriptor::get("/".repeat(11));
        assert!(generator.generate_key(&long).is_err());

        let ok = RequestDescriptor::get("/users");
        assert_eq!(generator.generate_key(&ok).unwrap().resource(), "/users");
    }

    #[test]
    fn test_display_is_short() {
        let key = compute_key(&Method::GET, "/api/users", &Value::Null);
        let rendered = key.to_string();
        assert!(rendered.starts_with("GET /api/users #"));
        assert_eq!(rendered.len(), "GET /api/users #".len() + 12);
    }
}
