//! Transport adapters.
//!
//! A transport owns the byte-level framing and nothing else: it feeds raw
//! strings to [`crate::mcp::server::McpServer::handle_message`] and writes
//! back whatever it returns. Both transports can run concurrently against
//! the same server.

pub mod http;
pub mod stdio;
