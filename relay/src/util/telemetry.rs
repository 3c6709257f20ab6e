//! Structured logging and optional OpenTelemetry export.
//!
//! [`Telemetry`] always installs a `tracing` fmt layer filtered by `RUST_LOG`
//! (default `info`). When any of `OTEL_EXPORTER_OTLP_ENDPOINT`,
//! `OTEL_EXPORTER_OTLP_HEADERS` or `OTEL_EXPORTER_OTLP_PROTOCOL` is set, spans
//! and metrics are also exported over OTLP (HTTP by default, gRPC when the
//! protocol says so).

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use opentelemetry_semantic_conventions::attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION};
use std::env;
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// HTTP tracing layer returned by [`Telemetry::http_tracing`].
pub type HttpTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    DefaultMakeSpan,
    DefaultOnRequest,
    DefaultOnResponse,
>;

/// OTLP transport, from `OTEL_EXPORTER_OTLP_PROTOCOL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryProtocol {
    Http,
    Grpc,
}

impl TelemetryProtocol {
    /// `None` unless OTLP export is configured through the environment.
    fn from_env() -> Option<Self> {
        let is_enabled = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
            || env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
        if !is_enabled {
            return None;
        }
        let protocol = match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
            Ok("grpc") => TelemetryProtocol::Grpc,
            _ => TelemetryProtocol::Http,
        };
        Some(protocol)
    }
}

/// Telemetry setup, and the exporters to flush on drop.
///
/// ```ignore
/// let telemetry = Telemetry::new()
///     .with_name(env!("CARGO_PKG_NAME"))
///     .with_version(env!("CARGO_PKG_VERSION"))
///     .register();
/// let app = app.layer(telemetry.http_tracing());
/// ```
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            tracer_provider: None,
            meter_provider: None,
        }
    }

    /// Service name reported to the collector.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Service version reported to the collector.
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Installs the global subscriber.
    ///
    /// Must be called at most once per process.
    pub fn register(mut self) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        match TelemetryProtocol::from_env() {
            Some(protocol) => match self.init_providers(protocol) {
                Ok((tracer_provider, meter_provider)) => {
                    let tracer = tracer_provider.tracer(self.name);
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(tracing_subscriber::fmt::layer())
                        .with(MetricsLayer::new(meter_provider.clone()))
                        .with(OpenTelemetryLayer::new(tracer))
                        .init();
                    tracing::info!(?protocol, "OpenTelemetry export is enabled");
                    self.tracer_provider = Some(tracer_provider);
                    self.meter_provider = Some(meter_provider);
                }
                Err(error) => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(tracing_subscriber::fmt::layer())
                        .init();
                    tracing::warn!(
                        %error,
                        "Failed to set up OpenTelemetry export, logging locally"
                    );
                }
            },
            None => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(tracing_subscriber::fmt::layer())
                    .init();
                tracing::info!("OpenTelemetry is not enabled");
            }
        }
        self
    }

    /// A `tower-http` layer recording one span per HTTP request.
    pub fn http_tracing(&self) -> HttpTraceLayer {
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO))
    }

    fn resource(&self) -> Resource {
        let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(self.name)
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, self.version),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    fn init_providers(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<(SdkTracerProvider, SdkMeterProvider), opentelemetry_otlp::ExporterBuildError> {
        let span_exporter = opentelemetry_otlp::SpanExporter::builder();
        let span_exporter = match protocol {
            TelemetryProtocol::Http => span_exporter.with_http().build()?,
            TelemetryProtocol::Grpc => span_exporter.with_tonic().build()?,
        };
        let tracer_provider = SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(self.resource())
            .with_batch_exporter(span_exporter)
            .build();

        let metric_exporter = opentelemetry_otlp::MetricExporter::builder();
        let metric_exporter = match protocol {
            TelemetryProtocol::Http => metric_exporter.with_http().build()?,
            TelemetryProtocol::Grpc => metric_exporter.with_tonic().build()?,
        };
        let reader = PeriodicReader::builder(metric_exporter)
            .with_interval(Duration::from_secs(30))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();
        let meter_provider = MeterProviderBuilder::default()
            .with_resource(self.resource())
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(meter_provider.clone());

        Ok((tracer_provider, meter_provider))
    }
}

/// Flushes and shuts down the exporters.
impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.take() {
            if let Err(err) = tracer_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
        if let Some(meter_provider) = self.meter_provider.take() {
            if let Err(err) = meter_provider.shutdown() {
                eprintln!("{err:?}");
            }
        }
    }
}
