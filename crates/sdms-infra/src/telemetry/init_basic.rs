use sdms_core::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub environment: String,
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            service_name: config.service_name.clone(),
            environment: config.environment.clone(),
            log_format: config.log_format,
            default_filter: config.log_filter.clone(),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
