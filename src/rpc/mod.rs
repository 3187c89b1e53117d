//! JSON-RPC translation layer
//!
//! Decodes `service_method` envelopes into dispatch keys and routes them to
//! registered handlers.

pub mod codec;
pub mod registry;
