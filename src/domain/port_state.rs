use std::fmt;

use crate::domain::models::MqttMessage;
use crate::domain::station_status::{Port, StationStatus};
use crate::domain::topics::{port_availability_topic, port_state_topic};

pub const STATE_ON: &str = "ON";
pub const STATE_OFF: &str = "OFF";
pub const AVAILABILITY_ONLINE: &str = "online";
pub const AVAILABILITY_OFFLINE: &str = "offline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStatus {
    InUse,
    Available,
    /// Vendor reports the port as out of service.
    Offline(String),
    Unknown(String),
}

impl PortStatus {
    pub fn classify(normalized: &str) -> Self {
        match normalized {
            "in_use" => Self::InUse,
            "available" => Self::Available,
            "unreachable" | "unavailable" | "maintenance_required" => {
                Self::Offline(normalized.to_string())
            }
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn of(port: &Port) -> Self {
        Self::classify(&port.normalized_status())
    }

    pub fn state(&self) -> &'static str {
        match self {
            Self::InUse => STATE_ON,
            _ => STATE_OFF,
        }
    }

    pub fn availability(&self) -> &'static str {
        match self {
            Self::InUse | Self::Available => AVAILABILITY_ONLINE,
            Self::Offline(_) | Self::Unknown(_) => AVAILABILITY_OFFLINE,
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InUse => f.write_str("online (in use)"),
            Self::Available => f.write_str("online (available)"),
            Self::Offline(code) | Self::Unknown(code) => write!(f, "offline ({code})"),
        }
    }
}

/// State and availability messages for every port, in port order.
pub fn build_states(status: &StationStatus) -> Vec<MqttMessage> {
    let mut messages = Vec::with_capacity(status.ports().len() * 2);

    for port in status.ports() {
        let port_status = PortStatus::of(port);
        let outlet = port.outlet_number;

        messages.push(MqttMessage::retained(
            port_state_topic(&status.device_id, outlet),
            port_status.state(),
        ));
        messages.push(MqttMessage::retained(
            port_availability_topic(&status.device_id, outlet),
            port_status.availability(),
        ));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::{PortStatus, build_states};
    use crate::domain::station_status::decode_station_status;

    fn pairs(messages: &[crate::domain::models::MqttMessage]) -> Vec<(&str, &str)> {
        messages
            .iter()
            .map(|message| (message.topic.as_str(), message.payload.as_str()))
            .collect()
    }

    #[test]
    fn maps_two_port_station_to_state_and_availability() {
        let status = decode_station_status(
            br#"{"deviceId": 12345, "portsInfo": {"ports": [
                {"outletNumber": 1, "statusV2": "available"},
                {"outletNumber": 2, "statusV2": "unreachable"}
            ]}}"#,
        )
        .expect("document should decode");

        let messages = build_states(&status);

        assert_eq!(
            pairs(&messages),
            vec![
                ("chargepoint/12345/port/1/state", "OFF"),
                ("chargepoint/12345/port/1/availability", "online"),
                ("chargepoint/12345/port/2/state", "OFF"),
                ("chargepoint/12345/port/2/availability", "offline"),
            ]
        );
        assert!(messages.iter().all(|message| message.retain));
    }

    #[test]
    fn emits_two_messages_per_port() {
        let status = decode_station_status(
            br#"{"deviceId": 5, "portsInfo": {"ports": [
                {"outletNumber": 1}, {"outletNumber": 2}, {"outletNumber": 3}
            ]}}"#,
        )
        .expect("document should decode");

        assert_eq!(build_states(&status).len(), 6);
    }

    #[test]
    fn emits_nothing_for_station_without_ports() {
        let status = decode_station_status(br#"{"deviceId": 5}"#).expect("document should decode");

        assert!(build_states(&status).is_empty());
    }

    #[test]
    fn prefers_status_v2_and_ignores_case() {
        let status = decode_station_status(
            br#"{"deviceId": 9, "portsInfo": {"ports": [
                {"outletNumber": 1, "status": "Available", "statusV2": "IN_USE"}
            ]}}"#,
        )
        .expect("document should decode");

        assert_eq!(
            pairs(&build_states(&status)),
            vec![
                ("chargepoint/9/port/1/state", "ON"),
                ("chargepoint/9/port/1/availability", "online"),
            ]
        );
    }

    #[test]
    fn classifies_every_known_code() {
        let cases = [
            ("in_use", "ON", "online"),
            ("available", "OFF", "online"),
            ("unreachable", "OFF", "offline"),
            ("unavailable", "OFF", "offline"),
            ("maintenance_required", "OFF", "offline"),
            ("unknown", "OFF", "offline"),
            ("reserved", "OFF", "offline"),
        ];

        for (code, state, availability) in cases {
            let status = PortStatus::classify(code);
            assert_eq!(status.state(), state, "state for {code}");
            assert_eq!(status.availability(), availability, "availability for {code}");
        }
    }

    #[test]
    fn describes_status_for_logs() {
        assert_eq!(PortStatus::InUse.to_string(), "online (in use)");
        assert_eq!(PortStatus::Available.to_string(), "online (available)");
        assert_eq!(
            PortStatus::classify("maintenance_required").to_string(),
            "offline (maintenance_required)"
        );
        assert_eq!(PortStatus::classify("unknown").to_string(), "offline (unknown)");
    }
}
