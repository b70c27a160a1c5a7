use std::sync::Arc;

use rmcp::model::{Tool, ToolAnnotations};
use serde_json::{Map, Value, json};

/// How a tool interacts with cluster state.
///
/// Exactly one capability applies per tool; it drives the mutually
/// exclusive `read_only`/`destructive` annotation hints advertised to
/// clients. Mutating tools that converge when repeated additionally set
/// the idempotent hint via [`ToolDescriptor::idempotent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Never mutates cluster state
    ReadOnly,
    /// Mutates cluster state
    Destructive,
}

/// Parameter value types accepted by tool input schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Object,
}

impl ParamType {
    const fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
        }
    }
}

/// One named parameter in a tool's input schema
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamType,
    pub required: bool,
}

impl ToolParam {
    pub const fn required(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
        }
    }
}

/// Static description of a tool: name, docs, parameters, and capability.
///
/// Descriptors are declared once per toolset and converted to wire-level
/// tool definitions when the registry lists tools.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub capability: Capability,
    pub idempotent: bool,
    pub params: Vec<ToolParam>,
}

impl ToolDescriptor {
    pub fn new(
        name: &'static str,
        title: &'static str,
        description: &'static str,
        capability: Capability,
        params: Vec<ToolParam>,
    ) -> Self {
        Self {
            name,
            title,
            description,
            capability,
            idempotent: capability == Capability::ReadOnly,
            params,
        }
    }

    /// Mark a mutating tool as converging when repeated (patch, scale,
    /// pause); read-only tools carry the hint already.
    pub const fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Render the JSON Schema for this tool's arguments
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.json_type(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema
    }

    /// Convert to the wire-level tool definition advertised to clients
    pub fn to_tool(&self) -> Tool {
        let read_only = self.capability == Capability::ReadOnly;
        let destructive = self.capability == Capability::Destructive;

        Tool::new(
            self.name,
            self.description,
            Arc::new(self.input_schema()),
        )
        .annotate(ToolAnnotations {
            title: Some(self.title.to_string()),
            read_only_hint: Some(read_only),
            destructive_hint: Some(destructive),
            idempotent_hint: Some(self.idempotent),
            open_world_hint: Some(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ToolDescriptor {
        ToolDescriptor::new(
            "core.pods_list",
            "List Pods",
            "List pods in a namespace or across the cluster",
            Capability::ReadOnly,
            vec![
                ToolParam::optional("namespace", ParamType::String, "Namespace to list from"),
                ToolParam::required("context", ParamType::String, "Cluster context name"),
            ],
        )
    }

    #[test]
    fn schema_lists_required_params() {
        let schema = sample().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["namespace"]["type"], "string");
        assert_eq!(schema["required"], json!(["context"]));
    }

    #[test]
    fn schema_omits_empty_required() {
        let descriptor = ToolDescriptor::new(
            "core.contexts_list",
            "List Contexts",
            "List configured cluster contexts",
            Capability::ReadOnly,
            vec![],
        );
        assert!(!descriptor.input_schema().contains_key("required"));
    }

    #[test]
    fn capability_drives_annotations() {
        let tool = sample().to_tool();
        let annotations = tool.annotations.unwrap();
        assert_eq!(annotations.read_only_hint, Some(true));
        assert_eq!(annotations.destructive_hint, Some(false));
        assert_eq!(annotations.idempotent_hint, Some(true));

        let destructive = ToolDescriptor::new(
            "core.pods_delete",
            "Delete Pod",
            "Delete a pod",
            Capability::Destructive,
            vec![],
        )
        .to_tool();
        let annotations = destructive.annotations.unwrap();
        assert_eq!(annotations.read_only_hint, Some(false));
        assert_eq!(annotations.destructive_hint, Some(true));
        assert_eq!(annotations.idempotent_hint, Some(false));
    }

    #[test]
    fn every_descriptor_carries_exactly_one_capability_mark() {
        let convergent = ToolDescriptor::new(
            "core.resources_scale",
            "Scale Resource",
            "Set the replica count of a scalable resource",
            Capability::Destructive,
            vec![],
        )
        .idempotent()
        .to_tool();
        let annotations = convergent.annotations.clone().unwrap();
        assert_eq!(annotations.read_only_hint, Some(false));
        assert_eq!(annotations.destructive_hint, Some(true));
        assert_eq!(annotations.idempotent_hint, Some(true));

        for tool in [sample().to_tool(), convergent] {
            let annotations = tool.annotations.unwrap();
            assert_ne!(annotations.read_only_hint, annotations.destructive_hint);
        }
    }
}
