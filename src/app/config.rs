use std::time::Duration;

use clap::Parser;

use crate::adapters::mqtt::{MqttCredentials, MqttSettings};
use crate::app::AppError;
use crate::app::runtime::RunMode;

#[derive(Debug, Parser)]
#[command(
    name = "chargepoint_mqtt",
    version,
    about = "ChargePoint MQTT Home Assistant bridge"
)]
pub struct Cli {
    /// ChargePoint station deviceIds to poll
    #[arg(
        long,
        env = "CHARGEPOINT_STATIONS",
        required = true,
        num_args = 1..,
        value_delimiter = ','
    )]
    pub stations: Vec<String>,

    /// MQTT broker host
    #[arg(long, env = "MQTT_HOST")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASS", hide_env_values = true)]
    pub mqtt_pass: Option<String>,

    /// MQTT discovery prefix
    #[arg(long, env = "MQTT_PREFIX", default_value = "homeassistant")]
    pub mqtt_prefix: String,

    /// Run only once and exit
    #[arg(long, env = "CHARGEPOINT_ONCE")]
    pub once: bool,

    /// Polling interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 60)]
    pub interval: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stations: Vec<String>,
    pub mqtt: MqttSettings,
    pub mqtt_prefix: String,
    pub mode: RunMode,
}

impl AppConfig {
    pub fn from_args() -> Result<Self, AppError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self, AppError> {
        let stations: Vec<String> = cli
            .stations
            .iter()
            .map(|station| station.trim().to_string())
            .collect();
        if stations.iter().any(String::is_empty) {
            return Err(AppError::config("--stations must not contain empty ids"));
        }

        let host = cli.mqtt_host.trim().to_string();
        if host.is_empty() {
            return Err(AppError::config("--mqtt-host is required"));
        }

        let credentials = match (non_empty(cli.mqtt_user), non_empty(cli.mqtt_pass)) {
            (Some(username), Some(password)) => Some(MqttCredentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(AppError::config(
                    "--mqtt-user and --mqtt-pass must be given together",
                ));
            }
        };

        let mqtt_prefix = cli.mqtt_prefix;
        if mqtt_prefix.trim().is_empty() {
            return Err(AppError::config("--mqtt-prefix must not be empty"));
        }
        if mqtt_prefix.ends_with('/') {
            return Err(AppError::config("--mqtt-prefix must not end with '/'"));
        }

        let mode = if cli.once {
            RunMode::Once
        } else if cli.interval == 0 {
            return Err(AppError::config("--interval must be greater than zero"));
        } else {
            RunMode::Continuous {
                interval: Duration::from_secs(cli.interval),
            }
        };

        Ok(Self {
            stations,
            mqtt: MqttSettings {
                host,
                port: cli.mqtt_port,
                credentials,
                client_id: format!("chargepoint-mqtt-{}", uuid::Uuid::new_v4()),
            },
            mqtt_prefix,
            mode,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
