//! Logging and OpenTelemetry initialization.
//!
//! Console logging is always on. When an OTLP endpoint is configured, traces,
//! logs and metrics are also exported over gRPC.

use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Timeout for OTLP exports - prevents blocking on unavailable endpoints
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Flushes OTLP exporters when dropped. Hold it for the life of `main`.
#[must_use = "telemetry is flushed when the guard is dropped"]
pub struct TelemetryGuard {
    providers: Option<(SdkTracerProvider, SdkLoggerProvider, SdkMeterProvider)>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let Some((tracer, logger, meter)) = self.providers.take() else {
            return;
        };
        tracing::info!("Flushing OpenTelemetry exporters");
        if let Err(e) = tracer.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", e);
        }
        if let Err(e) = meter.shutdown() {
            eprintln!("Failed to shut down meter provider: {:?}", e);
        }
        if let Err(e) = logger.shutdown() {
            eprintln!("Failed to shut down logger provider: {:?}", e);
        }
    }
}

/// `RUST_LOG` wins; otherwise `log_level`, which may be a bare level or a
/// full filter directive.
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
pub fn init(log_level: &str, otlp_endpoint: Option<&str>) -> Result<TelemetryGuard> {
    match otlp_endpoint {
        None => {
            tracing_subscriber::registry()
                .with(env_filter(log_level))
                .with(tracing_subscriber::fmt::layer())
                .try_init()
                .context("Failed to install tracing subscriber")?;
            Ok(TelemetryGuard { providers: None })
        }
        Some(endpoint) => init_otlp(log_level, endpoint),
    }
}

fn init_otlp(log_level: &str, otlp_endpoint: &str) -> Result<TelemetryGuard> {
    let resource = Resource::builder_empty()
        .with_service_name("wakeword")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let endpoint = normalize_endpoint(otlp_endpoint);

    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_span_processor(
            opentelemetry_sdk::trace::BatchSpanProcessor::builder(trace_exporter).build(),
        )
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource.clone())
        .build();

    let tracer = tracer_provider.tracer("wakeword");
    global::set_tracer_provider(tracer_provider.clone());

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP log exporter")?;

    let logger_provider = SdkLoggerProvider::builder()
        .with_log_processor(
            opentelemetry_sdk::logs::BatchLogProcessor::builder(log_exporter).build(),
        )
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(EXPORT_TIMEOUT)
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let meter_provider = SdkMeterProvider::builder()
        .with_reader(opentelemetry_sdk::metrics::PeriodicReader::builder(metric_exporter).build())
        .with_resource(resource)
        .build();

    global::set_meter_provider(meter_provider.clone());

    let telemetry_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let log_appender =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&logger_provider);

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .with(log_appender)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(endpoint = otlp_endpoint, "OpenTelemetry initialized");

    Ok(TelemetryGuard {
        providers: Some((tracer_provider, logger_provider, meter_provider)),
    })
}

/// Accept `host:port` as well as a full URL.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("localhost:4317"), "http://localhost:4317");
        assert_eq!(
            normalize_endpoint("https://collector:4317"),
            "https://collector:4317"
        );
    }
}
