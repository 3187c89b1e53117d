//! HTTP transport layer for the proxy
//!
//! Provides the single JSON-RPC endpoint and the CORS pre-flight middleware.

pub mod cors;
pub mod handlers;
