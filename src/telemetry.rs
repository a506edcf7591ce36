use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{TonicExporterBuilder, WithExportConfig};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Config, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing::warn;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

/// OTLP providers installed for the lifetime of the process.
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    /// Builds the OTLP trace and metrics pipelines and registers the tracer provider globally.
    ///
    /// Must run inside a tokio runtime; the batch exporters are spawned on it.
    pub fn install(endpoint: &str) -> Result<Self> {
        let service_resource = Resource::new(vec![
            KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ]);

        let tracer_provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(build_tonic_exporter(endpoint))
            .with_trace_config(Config::default().with_resource(service_resource.clone()))
            .install_batch(runtime::Tokio)
            .context("Failed to install tracer")?;

        let meter_provider = opentelemetry_otlp::new_pipeline()
            .metrics(runtime::Tokio)
            .with_exporter(build_tonic_exporter(endpoint))
            .with_resource(service_resource)
            .build()
            .context("Failed to install meter")?;

        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(tracer_provider.clone());

        Ok(Telemetry {
            tracer_provider,
            meter_provider,
        })
    }

    /// Flushes pending spans and metrics, then unregisters the global tracer provider.
    pub fn shutdown(self) {
        for result in self.tracer_provider.force_flush() {
            if let Err(err) = result {
                warn!("Failed to flush spans: {}", err);
            }
        }
        if let Err(err) = self.meter_provider.shutdown() {
            warn!("Failed to shut down meter provider: {}", err);
        }
        global::shutdown_tracer_provider();
    }
}

/// Installs the global subscriber.
///
/// Traces and metrics are exported over OTLP only when an endpoint is given. Console output is
/// always on without an endpoint and can be forced with `console`.
pub fn init_telemetry(endpoint: &Option<String>, console: bool) -> Result<Option<Telemetry>> {
    let telemetry = endpoint.as_deref().map(Telemetry::install).transpose()?;

    let tracer = telemetry
        .as_ref()
        .map(|t| t.tracer_provider.tracer(env!("CARGO_PKG_NAME")));
    let meter = telemetry.as_ref().map(|t| t.meter_provider.clone());

    let console = (endpoint.is_none() || console).then(tracing_subscriber::fmt::layer);
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new("INFO")))
        .with(tracer.map(OpenTelemetryLayer::new))
        .with(meter.map(MetricsLayer::new))
        .with(console)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(telemetry)
}

fn build_tonic_exporter(endpoint: &str) -> TonicExporterBuilder {
    opentelemetry_otlp::new_exporter()
        .tonic()
        .with_timeout(Duration::from_secs(15))
        .with_endpoint(endpoint)
}
