//! Handler registry
//!
//! Maps command names to the collaborator functions that perform the actual
//! hardware/network/filesystem work. The registry is built once at startup
//! and immutable afterwards, so independent engine instances can carry
//! independent handler sets.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use super::JsonMap;
use crate::error::EngineError;

/// Result of one handler invocation: a response map or a tagged failure
pub type HandlerResult = Result<Value, EngineError>;

/// A registered command handler
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, params: JsonMap) -> HandlerResult;
}

/// Adapter that lets plain async closures act as handlers
struct FnHandler {
    f: Box<dyn Fn(JsonMap) -> BoxFuture<'static, HandlerResult> + Send + Sync>,
}

#[async_trait]
impl CommandHandler for FnHandler {
    async fn handle(&self, params: JsonMap) -> HandlerResult {
        (self.f)(params).await
    }
}

/// Immutable-after-build mapping from command name to handler
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            handlers: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Accumulates handlers before the registry is frozen
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl RegistryBuilder {
    /// Register a boxed handler under `name`
    pub fn register(mut self, name: &str, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    /// Register an async closure under `name`
    pub fn register_fn<F, Fut>(self, name: &str, f: F) -> Self
    where
        F: Fn(JsonMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            name,
            Arc::new(FnHandler {
                f: Box::new(move |params| Box::pin(f(params))),
            }),
        )
    }

    /// Freeze the registry
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = HandlerRegistry::builder()
            .register_fn("echo", |params| async move {
                Ok(json!({"type": "echo", "params": params}))
            })
            .build();

        assert!(registry.contains("echo"));
        assert!(!registry.contains("missing"));

        let handler = registry.get("echo").expect("registered");
        let result = handler.handle(JsonMap::new()).await.expect("ok");
        assert_eq!(result["type"], "echo");
    }

    #[tokio::test]
    async fn test_handler_failure_is_reported() {
        let registry = HandlerRegistry::builder()
            .register_fn("fail", |_| async {
                Err(EngineError::Validation("Missing pin or value".into()))
            })
            .build();

        let handler = registry.get("fail").expect("registered");
        let err = handler.handle(JsonMap::new()).await.expect_err("fails");
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = HandlerRegistry::builder()
            .register_fn("x", |_| async { Ok(json!({"v": 1})) })
            .register_fn("x", |_| async { Ok(json!({"v": 2})) })
            .build();

        assert_eq!(registry.len(), 1);
    }
}
