//! Registry of functions the model may call mid-conversation.
//!
//! The embedding application registers handlers by name; when the transport
//! requests a call, the controller looks the name up, invokes the handler
//! with the parsed JSON arguments, and sends the result back over the event
//! channel. A request for an unregistered name is silently ignored.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Common trait for tool handlers (dyn-compatible).
pub trait ToolHandler: Send + Sync {
    /// Run the tool with parsed JSON arguments, producing a JSON result.
    fn call(
        &self,
        args: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<serde_json::Value>> + Send + '_>>;
}

/// Adapter so plain async closures can be registered without a newtype.
struct FnTool<F>(F);

impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    fn call(
        &self,
        args: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<serde_json::Value>> + Send + '_>> {
        Box::pin((self.0)(args))
    }
}

/// Name → handler mapping. Registration may happen at any time, including
/// while a session is active.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Mutex<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a boxed handler under `name`, replacing any previous one.
    pub fn register(&self, name: &str, handler: Box<dyn ToolHandler>) {
        self.handlers
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::from(handler));
    }

    /// Register an async closure under `name`.
    pub fn register_fn<F, Fut>(&self, name: &str, f: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        self.register(name, Box::new(FnTool(f)));
    }

    /// Invoke the handler registered under `name`, if any.
    ///
    /// Returns `None` when no handler is registered (the caller ignores the
    /// request) or `Some(result)` with the handler outcome.
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Option<anyhow::Result<serde_json::Value>> {
        // Don't hold the lock across the handler future.
        let handler = {
            let handlers = self.handlers.lock().unwrap();
            handlers.get(name)?.clone()
        };
        Some(handler.call(args).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_tool_is_dispatched() {
        let registry = ToolRegistry::new();
        registry.register_fn("echo", |args| async move { Ok(args) });

        let result = registry
            .dispatch("echo", serde_json::json!({"x": 1}))
            .await
            .expect("handler registered")
            .expect("handler succeeded");
        assert_eq!(result["x"], 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_none() {
        let registry = ToolRegistry::new();
        assert!(registry
            .dispatch("nope", serde_json::Value::Null)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_reregistering_replaces_handler() {
        let registry = ToolRegistry::new();
        registry.register_fn("t", |_| async { Ok(serde_json::json!(1)) });
        registry.register_fn("t", |_| async { Ok(serde_json::json!(2)) });
        let result = registry
            .dispatch("t", serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, serde_json::json!(2));
    }
}
