use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::domain::models::MqttMessage;

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
const REQUEST_CHANNEL_CAPACITY: usize = 64;

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish(&self, message: &MqttMessage) -> Result<(), PublishError>;
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("mqtt broker connection failed: {0}")]
    Connection(#[source] ConnectionError),
    #[error("mqtt broker did not acknowledge the connection within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to queue publish to {topic}: {source}")]
    Client {
        topic: String,
        #[source]
        source: ClientError,
    },
    #[error("publish to {topic} timed out")]
    Timeout { topic: String },
    #[error("failed to disconnect from broker: {0}")]
    Disconnect(#[source] ClientError),
    #[error("mqtt event loop task failed: {0}")]
    Driver(#[source] tokio::task::JoinError),
    #[error("mqtt event loop did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub credentials: Option<MqttCredentials>,
    pub client_id: String,
}

/// Outcome of publishing a batch; failures do not stop the rest of the batch.
#[derive(Debug, Default)]
pub struct PublishReport {
    pub attempted: usize,
    pub failures: Vec<PublishError>,
}

impl PublishReport {
    pub fn published(&self) -> usize {
        self.attempted - self.failures.len()
    }
}

pub async fn publish_all<K>(sink: &K, messages: &[MqttMessage]) -> PublishReport
where
    K: MessageSink + ?Sized,
{
    let mut report = PublishReport::default();

    for message in messages {
        report.attempted += 1;
        if let Err(error) = sink.publish(message).await {
            tracing::warn!(topic = %message.topic, error = %error, "mqtt publish failed");
            report.failures.push(error);
        }
    }

    report
}

/// Single broker connection shared by every station for the process lifetime.
pub struct MqttPublisher {
    client: AsyncClient,
    stop_flag: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl MqttPublisher {
    /// Connects and waits for CONNACK so an unusable broker fails at startup.
    pub async fn connect(settings: &MqttSettings) -> Result<Self, ConnectError> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(credentials) = &settings.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut event_loop))
            .await
            .map_err(|_| ConnectError::Timeout(CONNECT_TIMEOUT))??;

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "mqtt broker connected"
        );

        let stop_flag = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive_event_loop(event_loop, Arc::clone(&stop_flag)));

        Ok(Self {
            client,
            stop_flag,
            driver,
        })
    }

    /// Queues DISCONNECT behind any pending publishes and waits for the
    /// event loop to flush them. `Ok` means the event loop task has ended.
    pub async fn shutdown(self) -> Result<(), PublishError> {
        self.stop_flag.store(true, Ordering::Relaxed);
        let disconnect = self
            .client
            .disconnect()
            .await
            .map_err(PublishError::Disconnect);

        let stopped = match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.driver).await {
            Ok(Ok(())) => {
                tracing::info!("mqtt connection closed");
                Ok(())
            }
            Ok(Err(error)) => Err(PublishError::Driver(error)),
            Err(_) => Err(PublishError::ShutdownTimeout(SHUTDOWN_TIMEOUT)),
        };

        disconnect.and(stopped)
    }
}

#[async_trait]
impl MessageSink for MqttPublisher {
    async fn publish(&self, message: &MqttMessage) -> Result<(), PublishError> {
        let queued = self.client.publish(
            message.topic.as_str(),
            QoS::AtMostOnce,
            message.retain,
            message.payload.as_bytes(),
        );

        match tokio::time::timeout(PUBLISH_TIMEOUT, queued).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(PublishError::Client {
                topic: message.topic.clone(),
                source,
            }),
            Err(_) => Err(PublishError::Timeout {
                topic: message.topic.clone(),
            }),
        }
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), ConnectError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(error) => return Err(ConnectError::Connection(error)),
        }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop, stop_flag: Arc<AtomicBool>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(event) => tracing::trace!(?event, "mqtt event"),
            Err(error) => {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                // The next poll re-dials the broker.
                tracing::warn!(error = %error, "mqtt connection error");
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}


#[cfg(test)]
mod loopback_broker {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(super) enum Received {
        Publish {
            topic: String,
            payload: String,
            retain: bool,
        },
        Disconnect,
    }

    pub(super) struct Broker {
        pub(super) port: u16,
        pub(super) handle: JoinHandle<Vec<Received>>,
    }

    /// Accepts one MQTT 3.1.1 client, acknowledges CONNECT and records QoS 0
    /// publishes until DISCONNECT or EOF.
    pub(super) fn spawn() -> Broker {
        let listener = TcpListener::bind("127.0.0.1:0").expect("broker should bind");
        let port = listener
            .local_addr()
            .expect("addr should be available")
            .port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("client should connect");
            let mut received = Vec::new();

            while let Some((header, body)) = read_packet(&mut stream) {
                match header >> 4 {
                    1 => stream
                        .write_all(&[0x20, 0x02, 0x00, 0x00])
                        .expect("connack should be written"),
                    3 => {
                        let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
                        let topic = String::from_utf8_lossy(&body[2..2 + topic_len]).to_string();
                        let payload = String::from_utf8_lossy(&body[2 + topic_len..]).to_string();
                        received.push(Received::Publish {
                            topic,
                            payload,
                            retain: header & 0x01 == 0x01,
                        });
                    }
                    12 => stream
                        .write_all(&[0xD0, 0x00])
                        .expect("pingresp should be written"),
                    14 => {
                        received.push(Received::Disconnect);
                        break;
                    }
                    _ => {}
                }
            }

            received
        });

        Broker { port, handle }
    }

    fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
        let mut byte = [0_u8; 1];
        stream.read_exact(&mut byte).ok()?;
        let header = byte[0];

        let mut remaining = 0_usize;
        let mut shift = 0;
        loop {
            stream.read_exact(&mut byte).ok()?;
            remaining |= usize::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0_u8; remaining];
        stream.read_exact(&mut body).ok()?;
        Some((header, body))
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::loopback_broker::{self, Received};
    use super::test_support::RecordingSink;
    use super::{ConnectError, MessageSink, MqttPublisher, MqttSettings, publish_all};
    use crate::domain::models::MqttMessage;

    fn local_settings(port: u16) -> MqttSettings {
        MqttSettings {
            host: "127.0.0.1".to_string(),
            port,
            credentials: None,
            client_id: "chargepoint-mqtt-test".to_string(),
        }
    }

    #[tokio::test]
    async fn publishes_with_retain_flag_and_disconnects_on_shutdown() {
        let broker = loopback_broker::spawn();
        let publisher = MqttPublisher::connect(&local_settings(broker.port))
            .await
            .expect("connect should succeed");

        publisher
            .publish(&MqttMessage::retained("chargepoint/1/port/1/state", "ON"))
            .await
            .expect("retained publish should be queued");
        publisher
            .publish(&MqttMessage {
                topic: "chargepoint/1/port/1/availability".to_string(),
                payload: "online".to_string(),
                retain: false,
            })
            .await
            .expect("plain publish should be queued");

        publisher
            .shutdown()
            .await
            .expect("shutdown should stop the event loop");

        let received = tokio::task::spawn_blocking(move || broker.handle.join())
            .await
            .expect("join task should run")
            .expect("broker thread should finish");
        assert_eq!(
            received,
            vec![
                Received::Publish {
                    topic: "chargepoint/1/port/1/state".to_string(),
                    payload: "ON".to_string(),
                    retain: true,
                },
                Received::Publish {
                    topic: "chargepoint/1/port/1/availability".to_string(),
                    payload: "online".to_string(),
                    retain: false,
                },
                Received::Disconnect,
            ]
        );
    }

    #[tokio::test]
    async fn keeps_publishing_after_a_failed_message() {
        let sink = RecordingSink::rejecting(&["a/2"]);
        let messages = vec![
            MqttMessage::retained("a/1", "ON"),
            MqttMessage::retained("a/2", "OFF"),
            MqttMessage::retained("a/3", "online"),
        ];

        let report = publish_all(&sink, &messages).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.published(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(sink.topics(), vec!["a/1".to_string(), "a/3".to_string()]);
    }

    #[tokio::test]
    async fn connect_fails_fast_when_broker_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").expect("probe should bind");
            listener.local_addr().expect("addr should be available").port()
        };
        let result = MqttPublisher::connect(&local_settings(port)).await;

        assert!(matches!(result, Err(ConnectError::Connection(_))));
    }
}
