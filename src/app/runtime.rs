use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::chargepoint_http::{
    ChargePointHttpClient, DEFAULT_STATUS_URL, FetchError, StationSource,
};
use crate::adapters::mqtt::{MessageSink, MqttPublisher, PublishError, publish_all};
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::domain::discovery::build_discovery;
use crate::domain::port_state::{PortStatus, build_states};
use crate::domain::station_status::{DecodeError, decode_station_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Continuous { interval: Duration },
}

#[derive(Debug, Error)]
pub enum StationError {
    #[error("failed to fetch station status: {0}")]
    Fetch(#[source] FetchError),
    #[error("failed to decode station status: {0}")]
    Decode(#[source] DecodeError),
    #[error("failed to encode discovery payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("only {published} of {attempted} publishes succeeded, first failure: {first}")]
    Publish {
        published: usize,
        attempted: usize,
        #[source]
        first: PublishError,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub stations_ok: usize,
    pub stations_failed: usize,
    pub messages_published: usize,
}

pub struct StationPoller<'a, S, K: ?Sized> {
    source: S,
    sink: &'a K,
    stations: &'a [String],
    prefix: &'a str,
}

impl<'a, S, K> StationPoller<'a, S, K>
where
    S: StationSource,
    K: MessageSink + ?Sized,
{
    pub fn new(source: S, sink: &'a K, stations: &'a [String], prefix: &'a str) -> Self {
        Self {
            source,
            sink,
            stations,
            prefix,
        }
    }

    /// Runs cycles until `mode` says stop or `shutdown` resolves. A shutdown
    /// during a cycle abandons the rest of that cycle.
    pub async fn run<F>(&self, mode: RunMode, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received during poll cycle");
                    return;
                }
                _ = self.run_cycle() => {}
            }

            let RunMode::Continuous { interval } = mode else {
                return;
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        for station_id in self.stations {
            match self.poll_station(station_id).await {
                Ok(published) => {
                    report.stations_ok += 1;
                    report.messages_published += published;
                }
                Err(StationError::Publish {
                    published,
                    attempted,
                    first,
                }) => {
                    report.stations_failed += 1;
                    report.messages_published += published;
                    tracing::error!(
                        station_id = %station_id,
                        published,
                        attempted,
                        error = %first,
                        "error publishing station"
                    );
                }
                Err(error) => {
                    report.stations_failed += 1;
                    tracing::error!(
                        station_id = %station_id,
                        error = %error,
                        "error processing station"
                    );
                }
            }
        }

        tracing::info!(
            stations_ok = report.stations_ok,
            stations_failed = report.stations_failed,
            messages_published = report.messages_published,
            "poll cycle finished"
        );

        report
    }

    /// Fetch, map and publish one station. Returns the number of messages
    /// handed to the broker.
    async fn poll_station(&self, station_id: &str) -> Result<usize, StationError> {
        let body = self
            .source
            .fetch_station(station_id)
            .await
            .map_err(StationError::Fetch)?;
        let status = decode_station_status(&body).map_err(StationError::Decode)?;

        let discovery = build_discovery(&status, self.prefix)
            .to_message()
            .map_err(StationError::Encode)?;
        let states = build_states(&status);

        tracing::info!(
            station_id = %station_id,
            station_name = %status.display_name(),
            ports = status.ports().len(),
            "station status fetched"
        );
        for port in status.ports() {
            tracing::info!(
                station_id = %station_id,
                outlet = port.outlet_number,
                availability = %PortStatus::of(port),
                "port status"
            );
        }

        let mut messages = Vec::with_capacity(states.len() + 1);
        messages.push(discovery);
        messages.extend(states);

        let mut report = publish_all(self.sink, &messages).await;
        if report.failures.is_empty() {
            return Ok(report.attempted);
        }

        Err(StationError::Publish {
            published: report.published(),
            attempted: report.attempted,
            first: report.failures.swap_remove(0),
        })
    }
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::runtime)?;

    runtime.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<(), AppError> {
    let shutdown = shutdown_signal().map_err(AppError::runtime)?;
    tokio::pin!(shutdown);

    let source = ChargePointHttpClient::new(DEFAULT_STATUS_URL).map_err(AppError::runtime)?;
    let publisher = tokio::select! {
        _ = &mut shutdown => {
            tracing::info!("shutdown signal received while connecting");
            return Ok(());
        }
        connected = MqttPublisher::connect(&config.mqtt) => {
            connected.map_err(AppError::mqtt_connect)?
        }
    };

    let poller = StationPoller::new(source, &publisher, &config.stations, &config.mqtt_prefix);
    poller.run(config.mode, shutdown.as_mut()).await;

    if let Err(error) = publisher.shutdown().await {
        tracing::warn!(error = %error, "mqtt disconnect failed");
    }
    tracing::info!("exiting");
    Ok(())
}

/// Registers the signal handlers immediately; once installed they replace
/// the default terminate action, so every await after this point must race
/// the returned future.
#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}
