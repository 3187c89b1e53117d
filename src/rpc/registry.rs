//! Handler registry and dispatch
//!
//! The registry is assembled once through [`RegistryBuilder`] and is read-only
//! afterwards, so it can be shared across request tasks behind an `Arc`.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{RegistryError, RpcError};
use crate::rpc::codec::{CallKey, InternalCall};

/// A backend capability reachable through one dispatch key.
///
/// Handlers receive the positional params untouched and own their decoding.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, params: Vec<Value>) -> Result<Value, RpcError>;
}

/// Adapts an async closure into a [`Handler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    async fn call(&self, params: Vec<Value>) -> Result<Value, RpcError> {
        (self.0)(params).await
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<CallKey, Arc<dyn Handler>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `service.method`. The method must already be
    /// in its dispatch form (`GetCode`, not `getCode`).
    pub fn register<H>(
        &mut self,
        service: &str,
        method: &str,
        handler: H,
    ) -> Result<&mut Self, RegistryError>
    where
        H: Handler + 'static,
    {
        let key = CallKey::new(service, method);
        if !is_reachable(&key) {
            return Err(RegistryError::UnreachableKey(key.to_string()));
        }
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::DuplicateHandler(key.to_string()));
        }

        self.handlers.insert(key, Arc::new(handler));
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            handlers: self.handlers,
        }
    }
}

#[derive(Default)]
pub struct Registry {
    handlers: HashMap<CallKey, Arc<dyn Handler>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn contains(&self, key: &CallKey) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered dispatch keys, sorted for stable logging.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        keys.sort();
        keys
    }

    pub async fn invoke(&self, call: InternalCall) -> Result<Value, RpcError> {
        let Some(handler) = self.handlers.get(&call.key) else {
            return Err(RpcError::MethodNotFound(call.wire_method));
        };

        handler.call(call.params).await
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.keys())
            .finish()
    }
}

fn is_reachable(key: &CallKey) -> bool {
    !key.service.is_empty()
        && !key.service.contains('_')
        && key
            .method
            .chars()
            .next()
            .is_some_and(|first| !first.is_ascii_lowercase())
}
