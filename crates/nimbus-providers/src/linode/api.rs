// crates/nimbus-providers/src/linode/api.rs
// ============================================================================
// Module: Linode API Client
// Description: Thin HTTP client for the Linode v4 API.
// Purpose: Treat cloud call bodies as opaque JSON behind a small trait.
// Dependencies: reqwest, serde_json
// ============================================================================

//! ## Overview
//! The pipeline treats cloud API call bodies as opaque: a request path goes
//! in, JSON comes out. The trait keeps both tool arms testable against the
//! in-memory fake without a network.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

use crate::provider::ProviderError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default Linode API base URL.
pub const DEFAULT_API_URL: &str = "https://api.linode.com/v4";
/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Minimal Linode API surface used by the tool arms.
pub trait LinodeApi: Send + Sync {
    /// Issues a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on transport or status failures.
    fn get(&self, path: &str) -> Result<Value, ProviderError>;

    /// Issues a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on transport or status failures.
    fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError>;

    /// Issues a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] on transport or status failures.
    fn delete(&self, path: &str) -> Result<Value, ProviderError>;
}

// ============================================================================
// SECTION: HTTP Client
// ============================================================================

/// Blocking HTTP client for the Linode v4 API.
pub struct HttpLinodeApi {
    /// Base URL without a trailing slash.
    base_url: String,
    /// Bearer token for every request.
    token: String,
    /// Underlying HTTP client.
    client: reqwest::blocking::Client,
}

impl HttpLinodeApi {
    /// Builds a client with the given base URL, token, and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Api`] when the HTTP client cannot be built.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Api {
                status: None,
                message: format!("client construction failed: {err}"),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client,
        })
    }

    /// Sends one request and maps the response into opaque JSON.
    fn send(&self, request: reqwest::blocking::RequestBuilder) -> Result<Value, ProviderError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|err| ProviderError::Api {
                status: None,
                message: err.to_string(),
            })?;
        let status = response.status();
        let body: Value = response.json().unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(body);
        }
        Err(ProviderError::Api {
            status: Some(status.as_u16()),
            message: body
                .pointer("/errors/0/reason")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_string(),
        })
    }
}

impl LinodeApi for HttpLinodeApi {
    fn get(&self, path: &str) -> Result<Value, ProviderError> {
        self.send(self.client.get(format!("{}{path}", self.base_url)))
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        self.send(self.client.post(format!("{}{path}", self.base_url)).json(body))
    }

    fn delete(&self, path: &str) -> Result<Value, ProviderError> {
        self.send(self.client.delete(format!("{}{path}", self.base_url)))
    }
}

// ============================================================================
// SECTION: In-Memory Fake
// ============================================================================

/// In-memory Linode API fake for tests and offline runs.
///
/// # Invariants
/// - Instance identifiers are unique and monotonically increasing.
pub struct InMemoryLinodeApi {
    /// Instances keyed by identifier.
    instances: Mutex<BTreeMap<u64, Value>>,
    /// Next instance identifier.
    next_id: Mutex<u64>,
}

impl Default for InMemoryLinodeApi {
    fn default() -> Self {
        Self {
            instances: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(1),
        }
    }
}

impl InMemoryLinodeApi {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a lock-poisoning API error.
    fn poisoned() -> ProviderError {
        ProviderError::Api {
            status: None,
            message: "fake state lock poisoned".to_string(),
        }
    }

    /// Returns a 404-style error for a missing instance.
    fn not_found(id: u64) -> ProviderError {
        ProviderError::Api {
            status: Some(404),
            message: format!("instance {id} not found"),
        }
    }

    /// Parses an instance identifier out of a request path.
    fn instance_id(path: &str) -> Option<u64> {
        path.strip_prefix("/linode/instances/")?
            .split('/')
            .next()?
            .parse()
            .ok()
    }
}

impl LinodeApi for InMemoryLinodeApi {
    fn get(&self, path: &str) -> Result<Value, ProviderError> {
        match path {
            "/linode/instances" => {
                let instances = self.instances.lock().map_err(|_| Self::poisoned())?;
                let data: Vec<Value> = instances.values().cloned().collect();
                Ok(json!({"data": data, "results": data.len()}))
            }
            "/regions" => Ok(json!({
                "data": [
                    {"id": "us-east", "label": "Newark, NJ"},
                    {"id": "eu-west", "label": "London, UK"},
                ],
                "results": 2,
            })),
            "/linode/types" => Ok(json!({
                "data": [
                    {"id": "g6-nanode-1", "memory": 1024, "vcpus": 1},
                    {"id": "g6-standard-2", "memory": 4096, "vcpus": 2},
                ],
                "results": 2,
            })),
            _ => {
                let id = Self::instance_id(path)
                    .ok_or_else(|| ProviderError::Api {
                        status: Some(404),
                        message: format!("unknown path {path}"),
                    })?;
                let instances = self.instances.lock().map_err(|_| Self::poisoned())?;
                instances.get(&id).cloned().ok_or_else(|| Self::not_found(id))
            }
        }
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ProviderError> {
        if path == "/linode/instances" {
            let mut next_id = self.next_id.lock().map_err(|_| Self::poisoned())?;
            let id = *next_id;
            *next_id += 1;
            drop(next_id);
            let instance = json!({
                "id": id,
                "label": body.get("label").cloned().unwrap_or(Value::Null),
                "region": body.get("region").cloned().unwrap_or(Value::Null),
                "type": body.get("type").cloned().unwrap_or(Value::Null),
                "status": "running",
            });
            let mut instances = self.instances.lock().map_err(|_| Self::poisoned())?;
            instances.insert(id, instance.clone());
            return Ok(instance);
        }
        if let Some(id) = Self::instance_id(path) {
            if path.ends_with("/reboot") {
                let instances = self.instances.lock().map_err(|_| Self::poisoned())?;
                if !instances.contains_key(&id) {
                    return Err(Self::not_found(id));
                }
                return Ok(json!({}));
            }
        }
        Err(ProviderError::Api {
            status: Some(404),
            message: format!("unknown path {path}"),
        })
    }

    fn delete(&self, path: &str) -> Result<Value, ProviderError> {
        let id = Self::instance_id(path).ok_or_else(|| ProviderError::Api {
            status: Some(404),
            message: format!("unknown path {path}"),
        })?;
        let mut instances = self.instances.lock().map_err(|_| Self::poisoned())?;
        if instances.remove(&id).is_none() {
            return Err(Self::not_found(id));
        }
        Ok(json!({}))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions."
    )]

    use serde_json::json;

    use super::InMemoryLinodeApi;
    use super::LinodeApi;

    #[test]
    fn fake_instance_lifecycle() {
        let api = InMemoryLinodeApi::new();
        let created = api
            .post(
                "/linode/instances",
                &json!({"label": "web-1", "region": "us-east", "type": "g6-nanode-1"}),
            )
            .unwrap();
        let id = created.get("id").and_then(serde_json::Value::as_u64).unwrap();

        let listed = api.get("/linode/instances").unwrap();
        assert_eq!(listed.get("results"), Some(&json!(1)));

        api.post(&format!("/linode/instances/{id}/reboot"), &json!({})).unwrap();
        api.delete(&format!("/linode/instances/{id}")).unwrap();
        let err = api.get(&format!("/linode/instances/{id}")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
