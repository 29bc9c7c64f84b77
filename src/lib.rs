//! skillbridge-mcp: expose a skill registry as MCP tools over JSON-RPC 2.0.
//!
//! This library turns a set of registered skills into a Model Context
//! Protocol server: each skill becomes a callable tool with a generated
//! JSON-Schema descriptor, reachable over HTTP/SSE and line-delimited stdio
//! at the same time.
//!
//! # Modules
//!
//! - [`config`] — environment defaults, file overrides, deep merge
//! - [`error`] — error types
//! - [`mcp`] — JSON-RPC codec, dispatch core and transports
//! - [`skills`] — the registry seam the dispatch core consumes

pub mod config;
pub mod error;
pub mod mcp;
pub mod skills;
