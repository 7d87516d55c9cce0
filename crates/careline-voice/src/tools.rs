//! Tool registry and dispatch.
//!
//! The endpoint issues tool invocations mid-conversation; each one is run
//! concurrently and produces exactly one correlated result on the outbound
//! queue, success or not. A handler failure or panic never takes the
//! session down with it.

use crate::wire::{OutboundMessage, ToolInvocation};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Reserved tool name that ends the session instead of running a handler.
pub const HANG_UP_TOOL: &str = "hang_up";

/// A callable tool exposed to the conversational endpoint.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique tool name as declared to the endpoint.
    fn name(&self) -> &str;

    /// JSON schema describing the tool and its parameters.
    fn schema(&self) -> Value;

    /// Run the tool with the endpoint-supplied arguments.
    async fn execute(&self, args: Value) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;
}

/// Named collection of tool handlers declared to the endpoint at connect.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        debug!(tool = handler.name(), "registered tool handler");
        self.handlers.push(handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.iter().find(|h| h.name() == name).cloned()
    }

    /// Schemas for the session declaration, hang-up included.
    pub fn schemas(&self) -> Vec<Value> {
        let mut schemas: Vec<Value> = self.handlers.iter().map(|h| h.schema()).collect();
        schemas.push(json!({
            "name": HANG_UP_TOOL,
            "description": "End the call once the caller's needs are met and goodbyes are exchanged",
            "parameters": { "type": "object", "properties": {} }
        }));
        schemas
    }
}

/// Routes invocations from the endpoint to handlers and results back out.
pub struct ToolDispatcher {
    registry: ToolRegistry,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    on_hangup: Arc<dyn Fn() + Send + Sync>,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        on_hangup: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            registry,
            outbound,
            on_hangup,
        }
    }

    /// Dispatch a batch of invocations. Handlers run concurrently; `hang_up`
    /// is acknowledged inline and then signalled to the session.
    pub fn dispatch_batch(&self, calls: Vec<ToolInvocation>) {
        for call in calls {
            if call.name == HANG_UP_TOOL {
                debug!(id = %call.id, "hang-up requested by endpoint");
                let _ = self
                    .outbound
                    .send(OutboundMessage::tool_result(&call.id, &call.name, json!({ "ok": true })));
                (self.on_hangup)();
                continue;
            }

            let Some(handler) = self.registry.get(&call.name) else {
                warn!(id = %call.id, tool = %call.name, "unknown tool invoked");
                let _ = self.outbound.send(OutboundMessage::tool_error(
                    &call.id,
                    &call.name,
                    format!("unknown tool: {}", call.name),
                ));
                continue;
            };

            let outbound = self.outbound.clone();
            tokio::spawn(async move {
                let id = call.id;
                let name = call.name;
                // Inner spawn isolates handler panics into a JoinError.
                let joined =
                    tokio::spawn(async move { handler.execute(call.args).await }).await;
                let message = match joined {
                    Ok(Ok(result)) => {
                        debug!(id = %id, tool = %name, "tool completed");
                        OutboundMessage::tool_result(&id, &name, result)
                    }
                    Ok(Err(err)) => {
                        warn!(id = %id, tool = %name, error = %err, "tool failed");
                        OutboundMessage::tool_error(&id, &name, err.to_string())
                    }
                    Err(err) => {
                        warn!(id = %id, tool = %name, error = %err, "tool panicked");
                        OutboundMessage::tool_error(&id, &name, "tool execution aborted")
                    }
                };
                let _ = outbound.send(message);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn schema(&self) -> Value {
            json!({ "name": "echo", "parameters": { "type": "object" } })
        }

        async fn execute(
            &self,
            args: Value,
        ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            Ok(args)
        }
    }

    struct Failing;

    #[async_trait]
    impl ToolHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn schema(&self) -> Value {
            json!({ "name": "failing" })
        }

        async fn execute(
            &self,
            _args: Value,
        ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            Err("slot already taken".into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl ToolHandler for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn schema(&self) -> Value {
            json!({ "name": "panicking" })
        }

        async fn execute(
            &self,
            _args: Value,
        ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
            panic!("handler bug")
        }
    }

    fn invocation(id: &str, name: &str, args: Value) -> ToolInvocation {
        ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    fn dispatcher(
        registry: ToolRegistry,
    ) -> (
        ToolDispatcher,
        mpsc::UnboundedReceiver<OutboundMessage>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hung_up = Arc::new(AtomicBool::new(false));
        let flag = hung_up.clone();
        let dispatcher = ToolDispatcher::new(
            registry,
            tx,
            Arc::new(move || flag.store(true, Ordering::SeqCst)),
        );
        (dispatcher, rx, hung_up)
    }

    #[test]
    fn registry_declares_hang_up() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[1]["name"], HANG_UP_TOOL);
    }

    #[tokio::test]
    async fn successful_tool_sends_correlated_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let (dispatcher, mut rx, _) = dispatcher(registry);

        dispatcher.dispatch_batch(vec![invocation("t1", "echo", json!({ "day": "friday" }))]);

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match msg {
            OutboundMessage::ToolResult { tool_result } => {
                assert_eq!(tool_result.id, "t1");
                assert_eq!(tool_result.result["day"], "friday");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failure_and_panic_each_produce_one_error_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Panicking));
        let (dispatcher, mut rx, _) = dispatcher(registry);

        dispatcher.dispatch_batch(vec![
            invocation("t1", "failing", json!({})),
            invocation("t2", "panicking", json!({})),
        ]);

        let mut seen = Vec::new();
        for _ in 0..2 {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let OutboundMessage::ToolResult { tool_result } = msg else {
                panic!("expected tool result");
            };
            assert!(tool_result.result["error"].is_string());
            seen.push(tool_result.id);
        }
        seen.sort();
        assert_eq!(seen, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_not_dropped() {
        let (dispatcher, mut rx, _) = dispatcher(ToolRegistry::new());
        dispatcher.dispatch_batch(vec![invocation("t1", "no_such_tool", json!({}))]);

        let msg = rx.recv().await.unwrap();
        let OutboundMessage::ToolResult { tool_result } = msg else {
            panic!("expected tool result");
        };
        assert_eq!(tool_result.id, "t1");
        assert!(tool_result.result["error"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn hang_up_acknowledges_then_signals() {
        let (dispatcher, mut rx, hung_up) = dispatcher(ToolRegistry::new());
        dispatcher.dispatch_batch(vec![invocation("t7", HANG_UP_TOOL, json!({}))]);

        let msg = rx.recv().await.unwrap();
        let OutboundMessage::ToolResult { tool_result } = msg else {
            panic!("expected tool result");
        };
        assert_eq!(tool_result.id, "t7");
        assert_eq!(tool_result.result["ok"], true);
        assert!(hung_up.load(Ordering::SeqCst));
    }
}
