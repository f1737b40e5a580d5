//! WASM bindings for access policies.

#![cfg(feature = "wasm")]

use crate::context::EvaluationContext;
use crate::policy::AccessPolicy;
use wasm_bindgen::prelude::*;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn parse_context(context_json: &str) -> Result<EvaluationContext, JsValue> {
    serde_json::from_str(context_json).map_err(|e| JsValue::from_str(&format!("Invalid context: {}", e)))
}

/// WASM-compatible access policy wrapper.
#[wasm_bindgen]
pub struct WasmAccessPolicy {
    policy: AccessPolicy,
}

#[wasm_bindgen]
impl WasmAccessPolicy {
    /// Loads a policy from a YAML string.
    #[wasm_bindgen(js_name = fromYaml)]
    pub fn from_yaml(yaml: &str) -> Result<WasmAccessPolicy, JsValue> {
        let policy = AccessPolicy::from_yaml(yaml).map_err(js_error)?;
        Ok(Self { policy })
    }

    /// Loads a policy from a JSON string.
    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(json: &str) -> Result<WasmAccessPolicy, JsValue> {
        let policy = AccessPolicy::from_json(json).map_err(js_error)?;
        Ok(Self { policy })
    }

    /// Evaluates a JSON evaluation context.
    /// Returns `{"action": ..., "allowed": ...}` as a JSON string.
    #[wasm_bindgen]
    pub fn evaluate(&self, context_json: &str) -> Result<String, JsValue> {
        let context = parse_context(context_json)?;
        let enforcement = self.policy.enforce(&context).map_err(js_error)?;
        serde_json::to_string(&enforcement).map_err(js_error)
    }

    /// Quick evaluation that returns just allow/deny as a boolean.
    #[wasm_bindgen(js_name = isAllowed)]
    pub fn is_allowed(&self, context_json: &str) -> Result<bool, JsValue> {
        let context = parse_context(context_json)?;
        self.policy.evaluate(&context).map_err(js_error)
    }

    /// Restricted fields under `key`, given a JSON array of field names.
    /// Returns a JSON array of field names.
    #[wasm_bindgen(js_name = selectFields)]
    pub fn select_fields(&self, key: &str, context_json: &str, fields_json: &str) -> Result<String, JsValue> {
        let context = parse_context(context_json)?;
        let fields: Vec<String> =
            serde_json::from_str(fields_json).map_err(|e| JsValue::from_str(&format!("Invalid fields: {}", e)))?;

        let selected = self
            .policy
            .select_fields(key, &context, fields.iter().map(String::as_str))
            .map_err(js_error)?;
        serde_json::to_string(&selected).map_err(js_error)
    }
}

/// Logs a message to the console (for debugging).
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

/// Returns the version of the access policy engine.
#[wasm_bindgen]
pub fn version() -> String {
    crate::VERSION.to_string()
}
