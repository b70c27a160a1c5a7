use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::{Arc, Once};
use std::time::Instant;

use futures::FutureExt;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};
use rmcp::model::{CallToolResult, Content};
use serde_json::Value;

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::toolset::ToolSpec;

/// Instruments recorded around every tool invocation
pub struct McpMetrics {
    calls: Counter<u64>,
    latency: Histogram<f64>,
}

impl McpMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("navarch");
        Self {
            calls: meter
                .u64_counter(navarch_telemetry::metrics::TOOL_CALLS_TOTAL)
                .with_description("Tool invocations, by tool, context and outcome")
                .build(),
            latency: meter
                .f64_histogram(navarch_telemetry::metrics::TOOL_LATENCY_SECONDS)
                .with_description("Tool invocation latency")
                .with_unit("s")
                .build(),
        }
    }
}

impl Default for McpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform wrapper around tool dispatch
///
/// Every call flows through here: argument coercion (inside the `ToolSpec`
/// handler wrapper), panic isolation, error normalization into the
/// structured envelope, and one metric/log record per invocation.
pub struct Envelope {
    metrics: McpMetrics,
}

thread_local! {
    static LAST_PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Record a stack for every panic so the recovery path below can log it;
/// the hook chains to the previous one and captures on the panicking
/// thread, which is also the thread that resumes after `catch_unwind`.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> String {
    LAST_PANIC_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "backtrace unavailable".to_string())
}

impl Envelope {
    pub fn new() -> Self {
        install_panic_hook();
        Self {
            metrics: McpMetrics::new(),
        }
    }

    /// Run a tool and convert its outcome into a wire-level result
    pub async fn invoke(&self, ctx: Arc<ToolContext>, spec: &ToolSpec, args: Value) -> CallToolResult {
        let tool = spec.descriptor.name;
        let cluster = cluster_label(&args);
        let start = Instant::now();

        let outcome = std::panic::AssertUnwindSafe(spec.invoke(ctx, args))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => {
                tracing::info!(
                    tool,
                    cluster = %cluster,
                    duration_ms = elapsed_ms(start),
                    "tool call succeeded"
                );
                self.record(tool, &cluster, "ok", start);
                CallToolResult::success(vec![Content::text(render(&value))])
            }
            Ok(Err(error)) => {
                tracing::error!(
                    tool,
                    cluster = %cluster,
                    kind = error.kind(),
                    %error,
                    duration_ms = elapsed_ms(start),
                    "tool call failed"
                );
                self.record(tool, &cluster, error.kind(), start);
                error_result(&error, tool, &cluster)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                let stack = take_panic_backtrace();
                tracing::error!(tool, cluster = %cluster, panic = %message, %stack, "tool call panicked");
                let error = ToolError::Internal(format!("tool panicked: {message}"));
                self.record(tool, &cluster, error.kind(), start);
                error_result(&error, tool, &cluster)
            }
        }
    }

    fn record(&self, tool: &str, cluster: &str, outcome: &str, start: Instant) {
        let attributes = [
            KeyValue::new("tool", tool.to_string()),
            KeyValue::new("context", cluster.to_string()),
            KeyValue::new("success", outcome == "ok"),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.metrics.calls.add(1, &attributes);
        navarch_telemetry::metrics::record_duration(&self.metrics.latency, start, &attributes[..2]);
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// The context label used for metrics and logs; tools that take no context
/// argument report the default
fn cluster_label(args: &Value) -> String {
    match args.get("context").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "default".to_string(),
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn error_result(error: &ToolError, tool: &str, cluster: &str) -> CallToolResult {
    let envelope = render(&error.envelope(tool, cluster));
    // An absent optional feature is a normal answer, not a protocol error.
    if matches!(error, ToolError::FeatureNotInstalled { .. }) {
        CallToolResult::success(vec![Content::text(envelope)])
    } else {
        CallToolResult::error(vec![Content::text(envelope)])
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use navarch_client::{ClientBundle, ClientError, ClientProvider};
    use navarch_config::HelmConfig;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::descriptor::{Capability, ToolDescriptor};

    struct UnreachableProvider;

    #[async_trait]
    impl ClientProvider for UnreachableProvider {
        async fn get_bundle(&self, _context: &str) -> Result<Arc<ClientBundle>, ClientError> {
            Err(ClientError::Configuration("no cluster in tests".to_string()))
        }

        fn list_contexts(&self) -> Result<Vec<String>, ClientError> {
            Ok(vec![])
        }

        fn default_context(&self) -> String {
            "default".to_string()
        }
    }

    fn ctx() -> Arc<ToolContext> {
        Arc::new(ToolContext::new(
            Arc::new(UnreachableProvider),
            false,
            5,
            None,
            HelmConfig::default(),
        ))
    }

    fn descriptor(name: &'static str) -> ToolDescriptor {
        ToolDescriptor::new(name, name, "test tool", Capability::ReadOnly, vec![])
    }

    #[derive(Deserialize)]
    struct NoArgs {}

    #[derive(Deserialize)]
    struct NamedArgs {
        name: String,
    }

    fn result_text(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn success_passes_handler_value_through() {
        let spec = ToolSpec::new(descriptor("echo"), |_ctx, args: NamedArgs| async move {
            Ok(json!({ "echoed": args.name }))
        });

        let result = Envelope::new().invoke(ctx(), &spec, json!({ "name": "web" })).await;
        assert_ne!(result.is_error, Some(true));

        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();
        assert_eq!(body["echoed"], "web");
    }

    #[tokio::test]
    async fn bad_arguments_never_reach_the_handler() {
        let spec = ToolSpec::new(descriptor("strict"), |_ctx, _args: NamedArgs| async move {
            panic!("handler must not run")
        });

        let result = Envelope::new().invoke(ctx(), &spec, json!({ "name": 7 })).await;
        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(body["error"]["type"], "BadArgument");
    }

    #[tokio::test]
    async fn panics_are_isolated_into_internal_errors() {
        let spec = ToolSpec::new(descriptor("explode"), |_ctx, _args: NoArgs| async move { panic!("boom") });

        let result = Envelope::new().invoke(ctx(), &spec, json!({})).await;
        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();

        assert_eq!(result.is_error, Some(true));
        assert_eq!(body["error"]["type"], "InternalError");
        assert!(body["error"]["message"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn missing_feature_is_a_normal_answer() {
        let spec = ToolSpec::new(descriptor("autoscaling.keda_scaledobjects_list"), |_ctx, _args: NoArgs| async move {
            Err(ToolError::feature_not_installed("KEDA ScaledObject"))
        });

        let result = Envelope::new().invoke(ctx(), &spec, json!({})).await;
        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();

        assert_ne!(result.is_error, Some(true));
        assert_eq!(body["error"]["type"], "FeatureNotInstalled");
        assert_eq!(body["error"]["details"]["feature"], "KEDA ScaledObject");
    }

    #[tokio::test]
    async fn context_argument_labels_the_envelope() {
        let spec = ToolSpec::new(descriptor("fails"), |_ctx, _args: NoArgs| async move {
            Err(ToolError::Tool("lookup failed".to_string()))
        });

        let result = Envelope::new()
            .invoke(ctx(), &spec, json!({ "context": "staging" }))
            .await;
        let body: Value = serde_json::from_str(&result_text(&result)).unwrap();

        assert_eq!(body["error"]["cluster"], "staging");
        assert_eq!(body["error"]["tool"], "fails");
    }

    #[test]
    fn panic_hook_records_a_nonempty_stack() {
        install_panic_hook();
        assert!(std::panic::catch_unwind(|| panic!("boom")).is_err());

        let stack = take_panic_backtrace();
        assert!(!stack.is_empty());
        assert_ne!(stack, "backtrace unavailable");

        // The stack is consumed by the read.
        assert_eq!(take_panic_backtrace(), "backtrace unavailable");
    }
}
