//! Client side of the capability-server protocol.
//!
//! Servers are child processes (or any async byte stream) speaking JSON-RPC 2.0
//! with one message per line. The client performs the `initialize` handshake,
//! lists tools (following pagination), calls tools and answers `ping`.
//!
//! Quick start:
//! - `McpClient::spawn(&command, &Implementation::new("me", "1.0"), timeout)`
//! - `client.list_tools().await?` and `client.call_tool(name, args).await?`
//! - `client.shutdown().await` on every exit path.

mod client;
pub mod protocol;

pub use client::{McpClient, McpError, ServerCommand};
pub use protocol::{
  CallToolResult, ContentBlock, Implementation, InitializeResult, ToolAnnotations, ToolDescriptor,
};
