//! Tool registry: named tools with declared schemas and async handlers
//!
//! The registry is assembled once at startup and shared read-only behind an `Arc`.
//! Each tool pairs its `Tool` listing with a typed handler; arguments are decoded into
//! the handler's argument type and its output is checked against the declared output
//! schema before it leaves the registry.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use rust_mcp_sdk::schema::{Tool, ToolOutputSchema};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::UpstreamError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool `{name}` is already registered")]
    DuplicateName { name: String },
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },
    #[error("{tool}: invalid arguments: {message}")]
    Validation { tool: String, message: String },
    #[error("{tool}: {source}")]
    Upstream {
        tool: String,
        #[source]
        source: UpstreamError,
    },
    #[error("{tool}: output does not match declared schema: {message}")]
    InvalidOutput { tool: String, message: String },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "duplicate_tool",
            Self::UnknownTool { .. } => "tool_not_found",
            Self::Validation { .. } => "invalid_arguments",
            Self::Upstream { source, .. } => source.code(),
            Self::InvalidOutput { .. } => "invalid_output",
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::DuplicateName { name } | Self::UnknownTool { name } => name,
            Self::Validation { tool, .. }
            | Self::Upstream { tool, .. }
            | Self::InvalidOutput { tool, .. } => tool,
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    type Arguments: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    /// Runs the tool on arguments already decoded from the `tools/call` request.
    async fn call(&self, arguments: Self::Arguments) -> Result<Self::Output, HandlerError>;
}

enum InvocationFailure {
    Arguments(serde_json::Error),
    Handler(HandlerError),
    Output(String),
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn call_json(&self, arguments: Value) -> Result<Value, InvocationFailure>;
}

#[async_trait]
impl<H> ErasedHandler for H
where
    H: ToolHandler + 'static,
{
    async fn call_json(&self, arguments: Value) -> Result<Value, InvocationFailure> {
        let arguments: H::Arguments =
            serde_json::from_value(arguments).map_err(InvocationFailure::Arguments)?;
        let output = self
            .call(arguments)
            .await
            .map_err(InvocationFailure::Handler)?;
        serde_json::to_value(output).map_err(|err| InvocationFailure::Output(err.to_string()))
    }
}

pub struct ToolDescriptor {
    pub tool: Tool,
    handler: Arc<dyn ErasedHandler>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.tool.name)
            .field("title", &self.tool.title)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn new<H>(tool: Tool, handler: Arc<H>) -> Self
    where
        H: ToolHandler + 'static,
    {
        Self { tool, handler }
    }

    /// Declares the structured output shape, taken from a `JsonSchema`-derived map.
    pub fn with_output_schema(mut self, schema: Map<String, Value>) -> Self {
        self.tool.output_schema = Some(output_schema_from(&schema));
        self
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }
}

fn output_schema_from(schema: &Map<String, Value>) -> ToolOutputSchema {
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| {
            properties
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .as_object()
                        .map(|property| (name.clone(), property.clone()))
                })
                .collect()
        });

    ToolOutputSchema::new(required, properties, None)
}

/// Result of a successful invocation: the structured value and its text rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub structured: Map<String, Value>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), ToolError> {
        if self.get(descriptor.name()).is_some() {
            return Err(ToolError::DuplicateName {
                name: descriptor.tool.name,
            });
        }

        self.tools.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    /// `Tool` listings in registration order, as answered by `tools/list`.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|tool| tool.tool.clone()).collect()
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<ToolOutput, ToolError> {
        let descriptor = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        let tool = descriptor.name().to_string();

        let output = descriptor
            .handler
            .call_json(Value::Object(arguments.unwrap_or_default()))
            .await
            .map_err(|failure| match failure {
                InvocationFailure::Arguments(err) => ToolError::Validation {
                    tool: tool.clone(),
                    message: err.to_string(),
                },
                InvocationFailure::Handler(HandlerError::Upstream(source)) => {
                    ToolError::Upstream {
                        tool: tool.clone(),
                        source,
                    }
                }
                InvocationFailure::Output(message) => ToolError::InvalidOutput {
                    tool: tool.clone(),
                    message,
                },
            })?;

        let Value::Object(structured) = output else {
            return Err(ToolError::InvalidOutput {
                tool,
                message: "structured content must be a JSON object".to_string(),
            });
        };

        if let Some(schema) = descriptor.tool.output_schema.as_ref() {
            check_required_fields(schema, &structured)
                .map_err(|message| ToolError::InvalidOutput { tool, message })?;
        }

        let text = Value::Object(structured.clone()).to_string();
        Ok(ToolOutput { structured, text })
    }
}

/// Non-finite floats serialize to `null`, so a required field holding `null` is a failure.
fn check_required_fields(
    schema: &ToolOutputSchema,
    structured: &Map<String, Value>,
) -> Result<(), String> {
    match schema
        .required
        .iter()
        .find(|field| matches!(structured.get(field.as_str()), None | Some(Value::Null)))
    {
        Some(field) => Err(format!("missing required field `{field}`")),
        None => Ok(()),
    }
}
