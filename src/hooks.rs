//! Typed lifecycle hook bus.
//!
//! Every lifecycle point the agent core and tool executor pass through —
//! before/after a ReAct iteration, before/after tool dispatch, before/after
//! tool registration — emits a [`HookEvent`] carrying a free-form
//! [`HookContext`]. Handlers register with a priority (higher runs first),
//! an optional predicate, a per-registration timeout, and an error policy
//! deciding whether a failing handler aborts the emission (`FailClose`) or
//! is logged and ignored (`FailOpen`).

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Enumerated lifecycle events. The prompt/LLM pair exists for a debugger
/// UI to hook into request assembly and completion; the
/// core agent loop only emits the four `Agent*`/two `Tools*` events plus
/// the two `ToolRegister*` events from [`crate::tools::registry::ToolRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    AgentBeforeRun,
    AgentAfterRun,
    AgentBeforeIteration,
    AgentAfterIteration,
    ToolsBeforeExecute,
    ToolsAfterExecute,
    ToolRegisterBefore,
    ToolRegisterAfter,
    PromptBeforeRender,
    PromptAfterRender,
    LlmBeforeCall,
    LlmAfterCall,
}

/// The payload passed to every handler for one emission. `data` is a
/// free-form bag (e.g. `tool_name`, `tool_input`, `iteration`); a handler
/// may hand back a modified copy via [`HookOutcome::data`] to influence
/// handlers that run after it and the final value the emitter reads back.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub event: HookEvent,
    pub component: String,
    pub data: HashMap<String, Value>,
}

impl HookContext {
    pub fn new(event: HookEvent, component: impl Into<String>) -> Self {
        Self {
            event,
            component: component.into(),
            data: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// What a handler returns: whether to halt subsequent handlers for this
/// emission, and any data it wants merged back into the context.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    pub stop_propagation: bool,
    pub data: Option<HashMap<String, Value>>,
}

impl HookOutcome {
    pub fn continue_() -> Self {
        Self::default()
    }

    pub fn stop() -> Self {
        Self {
            stop_propagation: true,
            data: None,
        }
    }

    pub fn merge(data: HashMap<String, Value>) -> Self {
        Self {
            stop_propagation: false,
            data: Some(data),
        }
    }
}

/// What happens when a handler errors or exceeds its timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the emission; the error propagates to the caller.
    FailClose,
    /// Log the failure and continue to the next handler.
    FailOpen,
}

type HandlerFn = Arc<
    dyn Fn(HookContext) -> Pin<Box<dyn Future<Output = crate::error::Result<HookOutcome>> + Send>>
        + Send
        + Sync,
>;

type Predicate = Arc<dyn Fn(&HookContext) -> bool + Send + Sync>;

struct Registration {
    handler: HandlerFn,
    priority: i32,
    when: Option<Predicate>,
    timeout: Duration,
    error_policy: ErrorPolicy,
}

/// Builder for one [`HookBus::register`] call, so optional knobs
/// (`priority`/`when`/`timeout`/`error_policy`) don't need a long
/// positional signature.
pub struct HookRegistration<F> {
    handler: F,
    priority: i32,
    when: Option<Predicate>,
    timeout: Option<Duration>,
    error_policy: ErrorPolicy,
}

impl<F, Fut> HookRegistration<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::error::Result<HookOutcome>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            priority: 0,
            when: None,
            timeout: None,
            error_policy: ErrorPolicy::FailOpen,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&HookContext) -> bool + Send + Sync + 'static,
    {
        self.when = Some(Arc::new(predicate));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// The bus: one priority-ordered handler list per [`HookEvent`].
///
/// Registration takes a write lock; emission takes a read lock and runs
/// handlers sequentially in descending-priority order, higher priority
/// first.
pub struct HookBus {
    handlers: std::sync::RwLock<HashMap<HookEvent, Vec<Registration>>>,
    default_timeout: Duration,
}

impl HookBus {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            handlers: std::sync::RwLock::new(HashMap::new()),
            default_timeout,
        }
    }

    /// Registers a handler for `event` via a [`HookRegistration`] builder.
    pub fn register<F, Fut>(&self, event: HookEvent, registration: HookRegistration<F>)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<HookOutcome>> + Send + 'static,
    {
        let entry = Registration {
            handler: Arc::new(move |ctx| Box::pin((registration.handler)(ctx))),
            priority: registration.priority,
            when: registration.when,
            timeout: registration.timeout.unwrap_or(self.default_timeout),
            error_policy: registration.error_policy,
        };
        let mut guard = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let list = guard.entry(event).or_default();
        list.push(entry);
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Convenience wrapper over [`HookBus::register`] for callers who don't
    /// need the builder's optional knobs.
    pub fn on<F, Fut>(&self, event: HookEvent, handler: F)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<HookOutcome>> + Send + 'static,
    {
        self.register(event, HookRegistration::new(handler));
    }

    /// Emits `ctx` to every handler registered for `ctx.event`, highest
    /// priority first, skipping handlers whose `when` predicate rejects the
    /// context. A handler returning `stop_propagation` halts the remaining
    /// chain. A handler that times out or errors is handled per its own
    /// `error_policy`: `FailOpen` logs and continues, `FailClose` aborts the
    /// emission and returns the error to the caller.
    pub async fn emit(&self, mut ctx: HookContext) -> crate::error::Result<HookContext> {
        let event = ctx.event;
        let registrations: Vec<(HandlerFn, Option<Predicate>, Duration, ErrorPolicy)> = {
            let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match guard.get(&event) {
                Some(list) => list
                    .iter()
                    .map(|r| (r.handler.clone(), r.when.clone(), r.timeout, r.error_policy))
                    .collect(),
                None => return Ok(ctx),
            }
        };

        for (handler, when, timeout, error_policy) in registrations {
            if let Some(predicate) = &when {
                if !predicate(&ctx) {
                    continue;
                }
            }

            let call = handler(ctx.clone());
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(outcome)) => {
                    if let Some(data) = outcome.data {
                        ctx.data.extend(data);
                    }
                    if outcome.stop_propagation {
                        break;
                    }
                }
                Ok(Err(e)) => match error_policy {
                    ErrorPolicy::FailClose => return Err(e),
                    ErrorPolicy::FailOpen => {
                        tracing::warn!(event = ?event, error = %e, "hook handler failed, continuing (FailOpen)");
                    }
                },
                Err(_) => match error_policy {
                    ErrorPolicy::FailClose => return Err(crate::error::Error::timeout()),
                    ErrorPolicy::FailOpen => {
                        tracing::warn!(event = ?event, "hook handler timed out, continuing (FailOpen)");
                    }
                },
            }
        }

        Ok(ctx)
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_handlers_run_in_priority_order() {
        let bus = HookBus::default();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_a = order.clone();
        bus.register(
            HookEvent::AgentBeforeRun,
            HookRegistration::new(move |_ctx| {
                let order_a = order_a.clone();
                async move {
                    order_a.lock().unwrap().push("low");
                    Ok(HookOutcome::continue_())
                }
            })
            .priority(1),
        );

        let order_b = order.clone();
        bus.register(
            HookEvent::AgentBeforeRun,
            HookRegistration::new(move |_ctx| {
                let order_b = order_b.clone();
                async move {
                    order_b.lock().unwrap().push("high");
                    Ok(HookOutcome::continue_())
                }
            })
            .priority(10),
        );

        bus.emit(HookContext::new(HookEvent::AgentBeforeRun, "agent"))
            .await
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }

    #[tokio::test]
    async fn test_stop_propagation_halts_chain() {
        let bus = HookBus::default();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.register(
            HookEvent::ToolsBeforeExecute,
            HookRegistration::new(|_ctx| async move { Ok(HookOutcome::stop()) }).priority(10),
        );

        let calls2 = calls.clone();
        bus.register(
            HookEvent::ToolsBeforeExecute,
            HookRegistration::new(move |_ctx| {
                let calls2 = calls2.clone();
                async move {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    Ok(HookOutcome::continue_())
                }
            })
            .priority(1),
        );

        bus.emit(HookContext::new(HookEvent::ToolsBeforeExecute, "executor"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_when_predicate_filters_handler() {
        let bus = HookBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();

        bus.register(
            HookEvent::AgentBeforeIteration,
            HookRegistration::new(move |_ctx| {
                let calls2 = calls2.clone();
                async move {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    Ok(HookOutcome::continue_())
                }
            })
            .when(|ctx| ctx.get("iteration").and_then(|v| v.as_u64()) == Some(2)),
        );

        bus.emit(
            HookContext::new(HookEvent::AgentBeforeIteration, "agent").with("iteration", json!(1)),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.emit(
            HookContext::new(HookEvent::AgentBeforeIteration, "agent").with("iteration", json!(2)),
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_open_swallows_error_and_continues() {
        let bus = HookBus::default();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.register(
            HookEvent::ToolRegisterBefore,
            HookRegistration::new(|_ctx| async move { Err(crate::error::Error::other("boom")) })
                .priority(10)
                .error_policy(ErrorPolicy::FailOpen),
        );

        let ran2 = ran.clone();
        bus.register(
            HookEvent::ToolRegisterBefore,
            HookRegistration::new(move |_ctx| {
                let ran2 = ran2.clone();
                async move {
                    ran2.fetch_add(1, Ordering::SeqCst);
                    Ok(HookOutcome::continue_())
                }
            })
            .priority(1),
        );

        bus.emit(HookContext::new(HookEvent::ToolRegisterBefore, "registry"))
            .await
            .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_close_aborts_emission() {
        let bus = HookBus::default();
        bus.register(
            HookEvent::ToolRegisterBefore,
            HookRegistration::new(|_ctx| async move { Err(crate::error::Error::other("boom")) })
                .error_policy(ErrorPolicy::FailClose),
        );

        let result = bus
            .emit(HookContext::new(HookEvent::ToolRegisterBefore, "registry"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_handler_timeout_under_fail_close_errors() {
        let bus = HookBus::default();
        bus.register(
            HookEvent::AgentBeforeRun,
            HookRegistration::new(|_ctx| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(HookOutcome::continue_())
            })
            .timeout(Duration::from_millis(1))
            .error_policy(ErrorPolicy::FailClose),
        );

        let result = bus
            .emit(HookContext::new(HookEvent::AgentBeforeRun, "agent"))
            .await;
        assert!(matches!(result, Err(crate::error::Error::Timeout)));
    }

    #[tokio::test]
    async fn test_data_merge_flows_to_next_handler() {
        let bus = HookBus::default();
        bus.register(
            HookEvent::ToolsBeforeExecute,
            HookRegistration::new(|_ctx| async move {
                let mut data = HashMap::new();
                data.insert("rewritten".to_string(), json!(true));
                Ok(HookOutcome::merge(data))
            })
            .priority(10),
        );

        let result = bus
            .emit(HookContext::new(HookEvent::ToolsBeforeExecute, "executor"))
            .await
            .unwrap();
        assert_eq!(result.get("rewritten"), Some(&json!(true)));
    }
}
