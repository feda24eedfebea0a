mod config;
mod error;
mod logging;
mod runtime;

pub use config::{AppConfig, Cli};
pub use error::AppError;
pub use runtime::{CycleReport, RunMode, StationError, StationPoller};

pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; flags and the real environment still apply.
    let _ = dotenvy::dotenv();
    logging::init()?;

    let config = AppConfig::from_args()?;

    tracing::info!(
        stations = ?config.stations,
        mqtt_host = %config.mqtt.host,
        mqtt_port = config.mqtt.port,
        mqtt_auth = config.mqtt.credentials.is_some(),
        mqtt_prefix = %config.mqtt_prefix,
        mode = ?config.mode,
        "chargepoint bridge starting"
    );

    runtime::run(config)
}
