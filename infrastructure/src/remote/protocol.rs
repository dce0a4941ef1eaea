//! JSON-RPC wire format of the remote tool service.
//!
//! # Invocation
//!
//! ```text
//! POST {invoke_path}
//! {"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":<tool>,"arguments":{..}}}
//! ```
//!
//! The response `result` is flattened into `{"status":"success","results":[..]}`:
//!
//! | `result` shape | `results` |
//! |----------------|-----------|
//! | `{"content": [items]}` | each text item JSON-parsed (or kept as text), other items verbatim |
//! | `{"content": x}` | `x` |
//! | anything else | `result` itself |
//! | absent | the whole response body |
//!
//! # Manifest
//!
//! `GET {manifest_path}` answers `{"tools": ..}` where `tools` is either a
//! mapping of name to description or a list of objects carrying `name`.

use super::error::RemoteError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolguard_domain::{ToolDefinition, ToolParameter};

pub const TOOLS_CALL_METHOD: &str = "tools/call";

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: ToolCallParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

impl JsonRpcRequest {
    /// `tools/call` envelope. Each request travels on its own HTTP exchange,
    /// so the id is constant.
    pub fn tools_call(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method: TOOLS_CALL_METHOD,
            params: ToolCallParams {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Turn a response body into the flattened success payload, or the RPC error
/// it carries
pub fn flatten_response(body: Value) -> Result<Value, RemoteError> {
    let Value::Object(mut envelope) = body else {
        return Ok(success(body));
    };

    if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
        let rpc: RpcError = serde_json::from_value(error.clone()).unwrap_or(RpcError {
            code: 0,
            message: error.to_string(),
        });
        return Err(RemoteError::Rpc {
            code: rpc.code,
            message: rpc.message,
        });
    }

    match envelope.remove("result") {
        Some(result) => Ok(success(flatten_result(result))),
        None => Ok(success(Value::Object(envelope))),
    }
}

fn success(results: Value) -> Value {
    json!({"status": "success", "results": results})
}

fn flatten_result(result: Value) -> Value {
    match result {
        Value::Object(mut map) if map.contains_key("content") => match map.remove("content") {
            Some(Value::Array(items)) => Value::Array(items.into_iter().map(flatten_item).collect()),
            Some(other) => other,
            None => Value::Null,
        },
        other => other,
    }
}

fn flatten_item(item: Value) -> Value {
    let text = match &item {
        Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("text") => {
            map.get("text").and_then(Value::as_str)
        }
        _ => None,
    };
    match text {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        None => item,
    }
}

// ==================== Manifest ====================

/// Tool definitions from a manifest body, in manifest order
pub fn parse_manifest(body: &Value) -> Vec<ToolDefinition> {
    match body.get("tools") {
        Some(Value::Object(tools)) => tools
            .iter()
            .map(|(name, info)| tool_from_info(name, info))
            .collect(),
        Some(Value::Array(tools)) => tools
            .iter()
            .filter_map(|info| {
                let name = info.get("name")?.as_str()?;
                Some(tool_from_info(name, info))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn tool_from_info(name: &str, info: &Value) -> ToolDefinition {
    let description = info
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let mut tool = ToolDefinition::new(name, description);

    let schema = info.get("parameters").or_else(|| info.get("inputSchema"));
    for param in schema.map(parse_parameters).unwrap_or_default() {
        tool = tool.with_parameter(param);
    }
    tool
}

/// Parameters may come as a JSON schema (`properties` + `required`), a
/// mapping of name to spec, or a list of specs carrying `name`
fn parse_parameters(schema: &Value) -> Vec<ToolParameter> {
    match schema {
        Value::Object(map) => match map.get("properties") {
            Some(Value::Object(properties)) => {
                let required: Vec<&str> = map
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| r.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                properties
                    .iter()
                    .map(|(name, spec)| param_from_spec(name, spec, required.contains(&name.as_str())))
                    .collect()
            }
            _ => map
                .iter()
                .map(|(name, spec)| param_from_spec(name, spec, spec_required(spec)))
                .collect(),
        },
        Value::Array(items) => items
            .iter()
            .filter_map(|spec| {
                let name = spec.get("name")?.as_str()?;
                Some(param_from_spec(name, spec, spec_required(spec)))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn spec_required(spec: &Value) -> bool {
    spec.get("required").and_then(Value::as_bool).unwrap_or(false)
}

fn param_from_spec(name: &str, spec: &Value, required: bool) -> ToolParameter {
    let field = |key: &str| {
        spec.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let param_type = match field("type") {
        t if t.is_empty() => "string".to_string(),
        t => t,
    };
    ToolParameter::new(name, field("description"), required).with_type(param_type)
}

/// Object form of a manifest entry, as returned to callers
pub fn describe_tool(tool: &ToolDefinition) -> Value {
    let parameters: Map<String, Value> = tool
        .parameters
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                json!({"type": p.param_type, "description": p.description, "required": p.required}),
            )
        })
        .collect();
    json!({"name": tool.name, "description": tool.description, "parameters": parameters})
}
