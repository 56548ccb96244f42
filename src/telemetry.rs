//! Logging and tracing setup: the ambient observability stack.
//!
//! A plan run is one root span; each step and each phase tick nests under
//! it; guest operations (`exec`/`push`/`pull`/`reboot`) are leaf spans
//! carrying the guest's name as an attribute. `tracing`/`tracing-subscriber`
//! drive the human-readable log; `tracing-opentelemetry` plus the
//! `opentelemetry*` crates export the same spans to an OTLP collector when
//! `--otel`/`TMT_OTEL_ENDPOINT` is set. The workdir's `log.txt` (§4.1, one
//! serialized writer per §5) is attached as its own `fmt` layer alongside
//! an optional stdout layer gated by verbosity.

use std::path::Path;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// OTLP collector endpoint; `None` means console-only logging.
    pub otlp_endpoint: Option<String>,
    pub sampling_ratio: f64,
    /// Where human-readable log lines go, in addition to stdout (§4.1
    /// `log.txt`). `None` until a run directory has been allocated.
    pub log_file: Option<std::path::PathBuf>,
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tmt".to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            log_file: None,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    /// Reads `OTEL_SERVICE_NAME`, `OTEL_EXPORTER_OTLP_ENDPOINT`,
    /// `OTEL_TRACES_SAMPLER_ARG`, on top of the defaults above. Verbosity
    /// (`log_level`) and `log_file` are set by the caller from CLI flags
    /// and the allocated workdir, not from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(name) = std::env::var("OTEL_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.otlp_endpoint = Some(endpoint);
        }
        if let Ok(ratio) = std::env::var("OTEL_TRACES_SAMPLER_ARG") {
            if let Ok(r) = ratio.parse::<f64>() {
                config.sampling_ratio = r.clamp(0.0, 1.0);
            }
        }
        config
    }
}

/// Initializes the global `tracing` subscriber. Falls back to a plain
/// `fmt` layer (still writing to `log_file` if given) when no OTLP
/// endpoint is configured or the exporter fails to build.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let file_layer = config.log_file.as_deref().and_then(file_fmt_layer);

    if let Some(endpoint) = &config.otlp_endpoint {
        let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;
        let telemetry_layer = OpenTelemetryLayer::new(tracer.clone());

        tracing_subscriber::registry()
            .with(env_filter)
            .with(telemetry_layer)
            .with(tracing_subscriber::fmt::layer().compact())
            .with(file_layer)
            .try_init()
            .ok();

        tracing::info!(service = %config.service_name, endpoint = %endpoint, ratio = config.sampling_ratio, "telemetry initialized with OTLP export");
        Ok(Some(tracer))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .with(file_layer)
            .try_init()
            .ok();
        Ok(None)
    }
}

fn file_fmt_layer(
    path: &Path,
) -> Option<tracing_subscriber::fmt::Layer<tracing_subscriber::Registry, tracing_subscriber::fmt::format::DefaultFields, tracing_subscriber::fmt::format::Format, std::fs::File>>
{
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path).ok()?;
    Some(tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false))
}

fn init_otlp_tracer(service_name: &str, endpoint: &str, sampling_ratio: f64) -> anyhow::Result<Tracer> {
    let sampler = if sampling_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if sampling_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(sampling_ratio)
    };

    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(
            opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint).build_span_exporter()?,
            Tokio,
        )
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name.to_string())])),
        )
        .build();

    let tracer = tracer_provider.tracer(service_name.to_string());
    global::set_tracer_provider(tracer_provider);
    Ok(tracer)
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_otlp_endpoint() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "tmt");
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(config.sampling_ratio, 1.0);
    }
}
