// crates/nimbus-providers/src/linode/tools.rs
// ============================================================================
// Module: Linode Tools
// Description: Dual-arm tool implementations over the Linode API.
// Purpose: Provide service-backed and provider-native arms per operation.
// Dependencies: nimbus-core, crate::linode::api
// ============================================================================

//! ## Overview
//! Each Linode operation ships two `Tool`-shaped arms joined by the
//! migration router. The provider-native arm calls the API directly and
//! returns raw JSON; the service-backed arm goes through the legacy
//! [`LinodeService`] facade, which normalizes arguments, shapes responses,
//! and caches slow-moving catalogs the way the original service layer did.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use nimbus_core::ExecutionContext;
use nimbus_core::Tool;
use nimbus_core::ToolError;
use nimbus_core::ToolResult;
use serde_json::Value;
use serde_json::json;

use crate::linode::api::LinodeApi;
use crate::provider::ProviderError;

// ============================================================================
// SECTION: Operations
// ============================================================================

/// The Linode operations exposed as tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinodeOp {
    /// List compute instances.
    ListInstances,
    /// Fetch one instance by identifier.
    GetInstance,
    /// Create an instance.
    CreateInstance,
    /// Delete an instance.
    DeleteInstance,
    /// Reboot an instance.
    RebootInstance,
    /// List regions.
    ListRegions,
    /// List instance types.
    ListTypes,
}

impl LinodeOp {
    /// Every operation, in registration order.
    pub const ALL: &'static [Self] = &[
        Self::ListInstances,
        Self::GetInstance,
        Self::CreateInstance,
        Self::DeleteInstance,
        Self::RebootInstance,
        Self::ListRegions,
        Self::ListTypes,
    ];

    /// Returns the tool name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListInstances => "list_instances",
            Self::GetInstance => "get_instance",
            Self::CreateInstance => "create_instance",
            Self::DeleteInstance => "delete_instance",
            Self::RebootInstance => "reboot_instance",
            Self::ListRegions => "list_regions",
            Self::ListTypes => "list_types",
        }
    }

    /// Returns the tool description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ListInstances => "List Linode compute instances on the account.",
            Self::GetInstance => "Fetch one Linode instance by id.",
            Self::CreateInstance => "Create a Linode compute instance.",
            Self::DeleteInstance => "Delete a Linode compute instance.",
            Self::RebootInstance => "Reboot a Linode compute instance.",
            Self::ListRegions => "List available Linode regions.",
            Self::ListTypes => "List available Linode instance types.",
        }
    }

    /// Returns the JSON input schema.
    #[must_use]
    pub fn schema(self) -> Value {
        match self {
            Self::ListInstances | Self::ListRegions | Self::ListTypes => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false,
            }),
            Self::GetInstance | Self::DeleteInstance | Self::RebootInstance => json!({
                "type": "object",
                "properties": {
                    "instance_id": {"type": "integer", "minimum": 1},
                },
                "required": ["instance_id"],
                "additionalProperties": false,
            }),
            Self::CreateInstance => json!({
                "type": "object",
                "properties": {
                    "label": {"type": "string", "minLength": 1},
                    "region": {"type": "string", "minLength": 1},
                    "type": {"type": "string", "minLength": 1},
                    "image": {"type": "string"},
                },
                "required": ["label", "region", "type"],
                "additionalProperties": false,
            }),
        }
    }
}

/// Reads the required `instance_id` argument.
fn instance_id(params: &Value) -> Result<u64, ToolError> {
    params
        .get("instance_id")
        .and_then(Value::as_u64)
        .ok_or_else(|| ToolError::ParamValidation("instance_id must be a positive integer".to_string()))
}

// ============================================================================
// SECTION: Service Facade
// ============================================================================

/// Legacy service layer carried through the migration window.
///
/// The facade shapes raw API payloads into the summaries the old service
/// returned and caches the region and type catalogs between calls.
pub struct LinodeService {
    /// Underlying API client.
    api: Arc<dyn LinodeApi>,
    /// Cached region catalog.
    regions: Mutex<Option<Value>>,
    /// Cached type catalog.
    types: Mutex<Option<Value>>,
}

impl LinodeService {
    /// Creates the facade over an API client.
    #[must_use]
    pub fn new(api: Arc<dyn LinodeApi>) -> Self {
        Self {
            api,
            regions: Mutex::new(None),
            types: Mutex::new(None),
        }
    }

    /// Lists instances as label/status summaries.
    fn list_instances(&self) -> Result<Value, ProviderError> {
        let raw = self.api.get("/linode/instances")?;
        let summaries: Vec<Value> = raw
            .pointer("/data")
            .and_then(Value::as_array)
            .map(|instances| instances.iter().map(summarize_instance).collect())
            .unwrap_or_default();
        Ok(json!({"instances": summaries, "count": summaries.len()}))
    }

    /// Fetches one instance as a summary.
    fn get_instance(&self, id: u64) -> Result<Value, ProviderError> {
        let raw = self.api.get(&format!("/linode/instances/{id}"))?;
        Ok(summarize_instance(&raw))
    }

    /// Creates an instance and returns its summary.
    fn create_instance(&self, params: &Value) -> Result<Value, ProviderError> {
        let raw = self.api.post("/linode/instances", params)?;
        Ok(summarize_instance(&raw))
    }

    /// Deletes an instance.
    fn delete_instance(&self, id: u64) -> Result<Value, ProviderError> {
        self.api.delete(&format!("/linode/instances/{id}"))?;
        Ok(json!({"deleted": id}))
    }

    /// Reboots an instance.
    fn reboot_instance(&self, id: u64) -> Result<Value, ProviderError> {
        self.api.post(&format!("/linode/instances/{id}/reboot"), &json!({}))?;
        Ok(json!({"rebooted": id}))
    }

    /// Lists regions through the catalog cache.
    fn list_regions(&self) -> Result<Value, ProviderError> {
        Self::cached(&self.regions, || self.api.get("/regions"))
    }

    /// Lists instance types through the catalog cache.
    fn list_types(&self) -> Result<Value, ProviderError> {
        Self::cached(&self.types, || self.api.get("/linode/types"))
    }

    /// Serves a catalog from cache, filling it on first use.
    fn cached(
        slot: &Mutex<Option<Value>>,
        fetch: impl FnOnce() -> Result<Value, ProviderError>,
    ) -> Result<Value, ProviderError> {
        if let Ok(guard) = slot.lock() {
            if let Some(value) = guard.as_ref() {
                return Ok(value.clone());
            }
        }
        let value = fetch()?;
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(value.clone());
        }
        Ok(value)
    }
}

/// Reduces a raw instance payload to the legacy summary shape.
fn summarize_instance(raw: &Value) -> Value {
    json!({
        "id": raw.get("id").cloned().unwrap_or(Value::Null),
        "label": raw.get("label").cloned().unwrap_or(Value::Null),
        "region": raw.get("region").cloned().unwrap_or(Value::Null),
        "status": raw.get("status").cloned().unwrap_or(Value::Null),
    })
}

// ============================================================================
// SECTION: Tool Arms
// ============================================================================

/// Service-backed arm of one Linode operation.
pub struct ServiceBackedTool {
    /// Operation implemented by this arm.
    op: LinodeOp,
    /// Legacy service facade.
    service: Arc<LinodeService>,
}

impl ServiceBackedTool {
    /// Creates the arm for one operation.
    #[must_use]
    pub const fn new(op: LinodeOp, service: Arc<LinodeService>) -> Self {
        Self {
            op,
            service,
        }
    }
}

impl Tool for ServiceBackedTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn input_schema(&self) -> Value {
        self.op.schema()
    }

    fn execute(&self, _ctx: &ExecutionContext, params: &Value) -> ToolResult {
        let result = match self.op {
            LinodeOp::ListInstances => self.service.list_instances(),
            LinodeOp::GetInstance => self.service.get_instance(instance_id(params)?),
            LinodeOp::CreateInstance => self.service.create_instance(params),
            LinodeOp::DeleteInstance => self.service.delete_instance(instance_id(params)?),
            LinodeOp::RebootInstance => self.service.reboot_instance(instance_id(params)?),
            LinodeOp::ListRegions => self.service.list_regions(),
            LinodeOp::ListTypes => self.service.list_types(),
        };
        result.map_err(ToolError::from)
    }
}

/// Provider-native arm of one Linode operation.
pub struct ProviderNativeTool {
    /// Operation implemented by this arm.
    op: LinodeOp,
    /// Direct API client.
    api: Arc<dyn LinodeApi>,
}

impl ProviderNativeTool {
    /// Creates the arm for one operation.
    #[must_use]
    pub fn new(op: LinodeOp, api: Arc<dyn LinodeApi>) -> Self {
        Self {
            op,
            api,
        }
    }
}

impl Tool for ProviderNativeTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn input_schema(&self) -> Value {
        self.op.schema()
    }

    fn execute(&self, _ctx: &ExecutionContext, params: &Value) -> ToolResult {
        let result = match self.op {
            LinodeOp::ListInstances => self.api.get("/linode/instances"),
            LinodeOp::GetInstance => {
                self.api.get(&format!("/linode/instances/{}", instance_id(params)?))
            }
            LinodeOp::CreateInstance => self.api.post("/linode/instances", params),
            LinodeOp::DeleteInstance => {
                self.api.delete(&format!("/linode/instances/{}", instance_id(params)?))
            }
            LinodeOp::RebootInstance => self
                .api
                .post(&format!("/linode/instances/{}/reboot", instance_id(params)?), &json!({})),
            LinodeOp::ListRegions => self.api.get("/regions"),
            LinodeOp::ListTypes => self.api.get("/linode/types"),
        };
        result.map_err(ToolError::from)
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

    use std::sync::Arc;

    use nimbus_core::ExecutionContext;
    use nimbus_core::Tool;
    use serde_json::json;

    use super::LinodeOp;
    use super::LinodeService;
    use super::ProviderNativeTool;
    use super::ServiceBackedTool;
    use crate::linode::api::InMemoryLinodeApi;
    use crate::linode::api::LinodeApi;

    /// Seeds the fake with one instance and returns its id.
    fn seeded_api() -> (Arc<InMemoryLinodeApi>, u64) {
        let api = Arc::new(InMemoryLinodeApi::new());
        let created = api
            .post(
                "/linode/instances",
                &json!({"label": "web-1", "region": "us-east", "type": "g6-nanode-1"}),
            )
            .unwrap();
        let id = created.get("id").and_then(serde_json::Value::as_u64).unwrap();
        (api, id)
    }

    #[test]
    fn arms_agree_on_names_and_schemas() {
        let (api, _) = seeded_api();
        let service = Arc::new(LinodeService::new(Arc::clone(&api) as _));
        for op in LinodeOp::ALL {
            let backed = ServiceBackedTool::new(*op, Arc::clone(&service));
            let native = ProviderNativeTool::new(*op, Arc::clone(&api) as _);
            assert_eq!(backed.name(), native.name());
            assert_eq!(backed.input_schema(), native.input_schema());
        }
    }

    #[test]
    fn service_arm_returns_summaries() {
        let (api, id) = seeded_api();
        let service = Arc::new(LinodeService::new(Arc::clone(&api) as _));
        let tool = ServiceBackedTool::new(LinodeOp::GetInstance, service);
        let ctx = ExecutionContext::new("r1", "get_instance");
        let result = tool.execute(&ctx, &json!({"instance_id": id})).unwrap();
        assert_eq!(result.get("label"), Some(&json!("web-1")));
        // The legacy shape drops fields the raw payload carries.
        assert!(result.get("type").is_none());
    }

    #[test]
    fn native_arm_returns_raw_payloads() {
        let (api, id) = seeded_api();
        let tool = ProviderNativeTool::new(LinodeOp::GetInstance, Arc::clone(&api) as _);
        let ctx = ExecutionContext::new("r1", "get_instance");
        let result = tool.execute(&ctx, &json!({"instance_id": id})).unwrap();
        assert_eq!(result.get("type"), Some(&json!("g6-nanode-1")));
    }

    #[test]
    fn missing_instance_id_is_a_validation_error() {
        let (api, _) = seeded_api();
        let tool = ProviderNativeTool::new(LinodeOp::DeleteInstance, Arc::clone(&api) as _);
        let ctx = ExecutionContext::new("r1", "delete_instance");
        let err = tool.execute(&ctx, &json!({})).unwrap_err();
        assert!(matches!(err, nimbus_core::ToolError::ParamValidation(_)));
    }

    #[test]
    fn service_arm_caches_the_region_catalog() {
        let (api, _) = seeded_api();
        let service = Arc::new(LinodeService::new(Arc::clone(&api) as _));
        let tool = ServiceBackedTool::new(LinodeOp::ListRegions, service);
        let ctx = ExecutionContext::new("r1", "list_regions");
        let first = tool.execute(&ctx, &json!({})).unwrap();
        let second = tool.execute(&ctx, &json!({})).unwrap();
        assert_eq!(first, second);
    }
}
