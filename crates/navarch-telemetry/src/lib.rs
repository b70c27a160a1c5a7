//! Telemetry for Navarch
//!
//! Provides structured logging via the `tracing` ecosystem and OpenTelemetry
//! metrics with optional OTLP export. Without a telemetry config the process
//! logs through the fmt subscriber and metrics stay on the default meter
//! provider (a no-op unless the embedder installs one).

pub mod metrics;

use std::time::Duration;

use navarch_config::{ExportProtocol, LogFormat, LoggingConfig, TelemetryConfig};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;

// Re-export common OpenTelemetry types for metrics
pub use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Guard that ensures proper cleanup of telemetry resources on drop
pub struct TelemetryGuard {
    meter_provider: Option<SdkMeterProvider>,
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.meter_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown meter provider: {e}");
        }
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initialize logging and, when configured, OTLP metric/trace export
///
/// Returns a guard that must be held for the lifetime of the process.
///
/// # Errors
///
/// Returns an error if an OTLP exporter fails to initialize
pub fn init(logging: &LoggingConfig, telemetry: Option<&TelemetryConfig>) -> anyhow::Result<TelemetryGuard> {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let mut guard = TelemetryGuard {
        meter_provider: None,
        tracer_provider: None,
    };

    let registry = tracing_subscriber::registry().with(filter);

    // Boxed so both formats share one subscriber type under the OTel layer.
    let fmt = match logging.format {
        LogFormat::Text => fmt_layer().boxed(),
        LogFormat::Json => fmt_layer().json().boxed(),
    };

    if let Some(config) = telemetry {
        let resource = build_resource(config);

        let meter_provider = init_metrics(config, resource.clone())?;
        global::set_meter_provider(meter_provider.clone());
        guard.meter_provider = Some(meter_provider);

        let tracer_provider = init_tracer(config, resource)?;
        let tracer = tracer_provider.tracer("navarch");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        global::set_tracer_provider(tracer_provider.clone());
        guard.tracer_provider = Some(tracer_provider);

        registry.with(fmt).with(otel_layer).init();
    } else {
        registry.with(fmt).init();
    }

    Ok(guard)
}

type StderrLayer<S> = tracing_subscriber::fmt::Layer<
    S,
    tracing_subscriber::fmt::format::DefaultFields,
    tracing_subscriber::fmt::format::Format,
    fn() -> std::io::Stderr,
>;

// Logs go to stderr; stdout is reserved for the MCP stdio transport.
fn fmt_layer<S>() -> StderrLayer<S> {
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr as fn() -> std::io::Stderr)
}

/// Build an OpenTelemetry Resource from configuration
fn build_resource(config: &TelemetryConfig) -> Resource {
    use opentelemetry_semantic_conventions::resource as semconv;

    let mut attrs = vec![
        KeyValue::new(semconv::SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION").to_string()),
    ];
    for (key, value) in &config.resource_attributes {
        attrs.push(KeyValue::new(key.clone(), value.clone()));
    }

    Resource::builder().with_attributes(attrs).build()
}

/// Initialize OTLP metrics export
fn init_metrics(config: &TelemetryConfig, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    use opentelemetry_otlp::MetricExporter;
    use opentelemetry_sdk::metrics::PeriodicReader;

    let exporter = match config.protocol {
        ExportProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build gRPC metrics exporter: {e}"))?,
        ExportProtocol::HttpProto => MetricExporter::builder()
            .with_http()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP metrics exporter: {e}"))?,
    };

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.export_interval_secs))
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// Initialize OTLP trace export
fn init_tracer(
    config: &TelemetryConfig,
    resource: Resource,
) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry_otlp::SpanExporter;
    use opentelemetry_sdk::trace::SdkTracerProvider;

    let exporter = match config.protocol {
        ExportProtocol::Grpc => SpanExporter::builder()
            .with_tonic()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build gRPC span exporter: {e}"))?,
        ExportProtocol::HttpProto => SpanExporter::builder()
            .with_http()
            .with_endpoint(config.endpoint.as_str())
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP span exporter: {e}"))?,
    };

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(exporter)
        .build())
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

    use super::*;

    #[test]
    fn both_formats_compose_under_the_otel_layer() {
        for format in [LogFormat::Text, LogFormat::Json] {
            let fmt = match format {
                LogFormat::Text => fmt_layer().boxed(),
                LogFormat::Json => fmt_layer().json().boxed(),
            };
            let subscriber = tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(fmt)
                .with(tracing_opentelemetry::layer());
            drop(tracing::Dispatch::new(subscriber));
        }
    }
}
