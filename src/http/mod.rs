//! HTTP Transport layer for the Model Context Protocol
//!
//! Provides the external API routing: a single `POST /mcp` listener.

pub mod handlers;
