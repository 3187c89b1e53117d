use serde_json::Value;

use crate::errors::RegistryError;
use crate::rpc::registry::{handler_fn, RegistryBuilder};

pub const SERVICE: &str = "net";
pub const DEFAULT_NETWORK_ID: &str = "fabric-evm";

/// Hex form of the network identifier reported by `net_version`.
pub fn version(network_id: &str) -> String {
    hex::encode(network_id.as_bytes())
}

pub fn register(builder: &mut RegistryBuilder, network_id: &str) -> Result<(), RegistryError> {
    let version = Value::String(version(network_id));
    builder.register(
        SERVICE,
        "Version",
        handler_fn(move |_params| {
            let version = version.clone();
            async move { Ok(version) }
        }),
    )?;
    Ok(())
}
