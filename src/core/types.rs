//! # Core Types
//!
//! The request descriptor that identifies a remote resource, and the
//! [`Transport`] boundary the cache delegates actual network calls to.

use super::error::CacheResult;
use async_trait::async_trait;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

/// Describes a single remote read: method, resource identifier and payload
///
/// The payload is held as a JSON value so that it can be canonicalized for
/// key generation and handed to the transport verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub resource: String,
    pub payload: Value,
}

impl RequestDescriptor {
    /// Create a descriptor without a payload
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            payload: Value::Null,
        }
    }

    /// Shorthand for a `GET` descriptor
    pub fn get(resource: impl Into<String>) -> Self {
        Self::new(Method::GET, resource)
    }

    /// Shorthand for a `POST` descriptor
    pub fn post(resource: impl Into<String>) -> Self {
        Self::new(Method::POST, resource)
    }

    /// Attach a payload
    ///
    /// Fails with a key generation error when the payload cannot be
    /// represented as JSON, e.g. a map with non-string keys.
    pub fn with_payload<P: Serialize + ?Sized>(mut self, payload: &P) -> CacheResult<Self> {
        self.payload = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Attach an already-built JSON payload
    pub fn with_json(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.resource)
    }
}

/// The network boundary consumed by the cache
///
/// Retries, timeouts, authentication and body encoding all belong to the
/// transport. The cache only distinguishes `Ok` from `Err` after a single
/// call.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opaque response value, stored and handed back verbatim
    type Response: Send + Sync + 'static;

    /// Opaque transport error, propagated to callers unchanged
    type Error: std::error::Error + Send + Sync + 'static;

    /// Perform one request
    async fn call(&self, request: &RequestDescriptor) -> Result<Self::Response, Self::Error>;
}

#[async_trait]
impl<T: Transport> Transport for std::sync::Arc<T> {
    type Response = T::Response;
    type Error = T::Error;

    async fn call(&self, request: &RequestDescriptor) -> Result<Self::Response, Self::Error> {
        (**self).call(request).await
    }
}

/// Adapts an async closure into a [`Transport`]
pub struct FnTransport<F, Fut, R, E> {
    call_fn: F,
    _marker: PhantomData<fn() -> (Fut, R, E)>,
}

impl<F, Fut, R, E> FnTransport<F, Fut, R, E>
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a transport from a closure
    pub fn new(call_fn: F) -> Self {
        Self {
            call_fn,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, R, E> Transport for FnTransport<F, Fut, R, E>
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = R;
    type Error = E;

    async fn call(&self, request: &RequestDescriptor) -> Result<R, E> {
        (self.call_fn)(request.clone()).await
    }
}

/// Build a [`Transport`] from an async closure
pub fn transport_fn<F, Fut, R, E>(call_fn: F) -> FnTransport<F, Fut, R, E>
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    FnTransport::new(call_fn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_descriptor_with_payload() {
        let request = RequestDescriptor::post("/api/users")
            .with_payload(&serde_json::json!({"name": "ada"}))
            .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.payload["name"], "ada");
        assert_eq!(request.to_string(), "POST /api/users");
    }

    #[test]
    fn test_non_serializable_payload_is_rejected() {
        let mut payload = HashMap::new();
        payload.insert(vec![1u8, 2], "tuple keys are not JSON");

        let result = RequestDescriptor::get("/api/things").with_payload(&payload);
        assert!(matches!(
            result,
            Err(crate::core::error::CacheError::KeyGeneration { .. })
        ));
    }

    #[tokio::test]
    async fn test_fn_transport() {
        let transport = transport_fn(|request: RequestDescriptor| async move {
            Ok::<_, std::io::Error>(format!("echo {}", request.resource))
        });

        let response = transport.call(&RequestDescriptor::get("/ping")).await.unwrap();
        assert_eq!(response, "echo /ping");
    }
}
