//! MCPEngine (C7): JSON-RPC 2.0 dispatch implementing the MCP protocol
//! semantics over the skill catalog (C5) and session registry (C6).
//!
//! The transport (framing, SSE, header handling) lives one layer up in
//! `skillforge-gateway`; this crate only knows about JSON-RPC envelopes
//! and session ids, never HTTP.

mod engine;
mod jsonrpc;
mod render;

pub use engine::{DispatchOutcome, EngineConfig, MCPEngine};
pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use render::render_instructions;
