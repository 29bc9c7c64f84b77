//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes a skill registry as MCP tools over JSON-RPC 2.0. The dispatch
//! core is transport-agnostic; HTTP/SSE and stdio adapters feed it raw
//! strings and both can run concurrently against the same server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MCP Server                           │
//! │                                                              │
//! │   ┌──────────────┐     ┌─────────────┐     ┌────────────┐    │
//! │   │  Transports  │────▶│   Server    │────▶│   Skills   │    │
//! │   │ (http, stdio)│     │ (dispatch,  │     │ (registry) │    │
//! │   └──────────────┘     │  sessions)  │     └────────────┘    │
//! │                        └─────────────┘                       │
//! │                               │                              │
//! │              ┌────────────────┴───────────────┐              │
//! │              ▼                                ▼              │
//! │      ┌──────────────┐                 ┌──────────────┐       │
//! │      │   protocol   │                 │ schema/result│       │
//! │      │ (JSON-RPC)   │                 │ (conversion) │       │
//! │      └──────────────┘                 └──────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2025-03-26.

pub mod protocol;
pub mod result;
pub mod schema;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use result::{ToolContent, ToolResult};
pub use schema::ToolDescriptor;
pub use server::McpServer;
