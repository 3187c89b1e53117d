//! Services served by the proxy itself
//!
//! Ledger-backed services such as `eth` are supplied by the embedding
//! application; only the static `net` service lives here.

pub mod net;
