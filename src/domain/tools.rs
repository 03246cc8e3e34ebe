//! Tools exposed via Model Context Protocol
//!
//! Provides `add` and `search-books`; the latter delegates to a [`BookSearch`] upstream.

use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::macros;
use serde::{Deserialize, Serialize, Serializer};

use crate::books_client::{BookRecord, BookSearch};
use crate::domain::registry::{HandlerError, ToolDescriptor, ToolError, ToolHandler, ToolRegistry};

pub const ADD_TOOL: &str = "add";
pub const SEARCH_BOOKS_TOOL: &str = "search-books";

/// Largest integer an f64 represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[macros::mcp_tool(name = "add", title = "Addition Tool", description = "Add two numbers")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct AddTool {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Serialize, macros::JsonSchema)]
pub struct AddOutput {
    #[serde(serialize_with = "serialize_number")]
    pub result: f64,
}

#[macros::mcp_tool(
    name = "search-books",
    title = "Search books",
    description = "Search for books in the Open Library API by title, author, or keyword"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct SearchBooksTool {
    /// Title, author, or keyword to search for.
    pub query: String,
}

#[derive(Debug, Serialize, macros::JsonSchema)]
pub struct SearchBooksOutput {
    pub docs: Vec<BookRecord>,
}

pub struct Adder;

#[async_trait]
impl ToolHandler for Adder {
    type Arguments = AddTool;
    type Output = AddOutput;

    async fn call(&self, arguments: AddTool) -> Result<AddOutput, HandlerError> {
        Ok(AddOutput {
            result: arguments.a + arguments.b,
        })
    }
}

pub struct BookSearcher {
    client: Arc<dyn BookSearch>,
}

impl BookSearcher {
    pub fn new(client: Arc<dyn BookSearch>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolHandler for BookSearcher {
    type Arguments = SearchBooksTool;
    type Output = SearchBooksOutput;

    async fn call(&self, arguments: SearchBooksTool) -> Result<SearchBooksOutput, HandlerError> {
        let docs = self.client.search(&arguments.query).await?;
        Ok(SearchBooksOutput { docs })
    }
}

pub fn add_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(AddTool::tool(), Arc::new(Adder))
        .with_output_schema(AddOutput::json_schema())
}

pub fn search_books_descriptor(client: Arc<dyn BookSearch>) -> ToolDescriptor {
    ToolDescriptor::new(SearchBooksTool::tool(), Arc::new(BookSearcher::new(client)))
        .with_output_schema(SearchBooksOutput::json_schema())
}

pub fn build_registry(client: Arc<dyn BookSearch>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(add_descriptor())?;
    registry.register(search_books_descriptor(client))?;
    Ok(registry)
}

/// Writes integral values as JSON integers so `2 + 3` reads `5`, not `5.0`.
/// Non-finite values become `null` and fail output validation.
fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        return serializer.serialize_i64(*value as i64);
    }

    serializer.serialize_f64(*value)
}
