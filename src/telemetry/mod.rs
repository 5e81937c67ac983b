//! Logging and OpenTelemetry setup for the dispatcher.
//!
//! Every process gets a `tracing` fmt layer on stderr. With an OTLP
//! endpoint, task spans, dispatcher metrics and log records are also
//! exported over gRPC.

pub mod metrics;
pub mod task;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{Error, Result};

/// Instrumentation scope for hookq's tracer.
const TRACER_NAME: &str = "hookq";

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. `http://localhost:4317`. `None` keeps
    /// output local.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Filter directives used when `RUST_LOG` is unset.
    pub log_level: String,
}

/// Keeps the export pipelines alive. Dropping it flushes and shuts them
/// down, so hold it until the dispatcher has stopped.
pub struct TelemetryGuard {
    pipelines: Option<Pipelines>,
}

struct Pipelines {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl TelemetryGuard {
    /// Whether signals are being exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.pipelines.is_some()
    }

    pub fn force_flush(&self) {
        if let Some(p) = &self.pipelines {
            let _ = p.tracer.force_flush();
            let _ = p.meter.force_flush();
            let _ = p.logger.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // Logs first so records emitted while spans close still go out.
        if let Some(p) = self.pipelines.take() {
            let _ = p.logger.shutdown();
            let _ = p.meter.shutdown();
            let _ = p.tracer.shutdown();
        }
    }
}

/// Install the global subscriber (and meter provider when exporting).
///
/// # Errors
///
/// Fails if an OTLP exporter cannot be built or a global subscriber is
/// already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let Some(endpoint) = config.endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(subscriber_error)?;
        return Ok(TelemetryGuard { pipelines: None });
    };

    let pipelines = build_pipelines(&endpoint, resource(config.service_name))?;
    opentelemetry::global::set_meter_provider(pipelines.meter.clone());

    let trace_layer =
        tracing_opentelemetry::layer().with_tracer(pipelines.tracer.tracer(TRACER_NAME));
    let log_layer =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&pipelines.logger);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(subscriber_error)?;

    Ok(TelemetryGuard {
        pipelines: Some(pipelines),
    })
}

fn resource(service_name: String) -> Resource {
    use opentelemetry::KeyValue;
    use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;

    Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")))
        .build()
}

fn build_pipelines(endpoint: &str, resource: Resource) -> Result<Pipelines> {
    use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

    let spans = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("span", e))?;
    let metrics = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("metric", e))?;
    let logs = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| exporter_error("log", e))?;

    Ok(Pipelines {
        tracer: SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build(),
        meter: SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource.clone())
            .build(),
        logger: SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build(),
    })
}

fn exporter_error(signal: &str, err: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {err}"))
}

fn subscriber_error(err: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to init tracing subscriber: {err}"))
}
