//! Tool registry, schemas, and the tools exposed over the MCP protocol

pub mod registry;
pub mod tools;
