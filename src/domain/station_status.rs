use serde::{Deserialize, Deserializer};
use thiserror::Error;

const UNKNOWN: &str = "Unknown";

/// Station document as returned by the ChargePoint map API. Only the fields
/// the bridge publishes are kept; everything else in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatus {
    #[serde(deserialize_with = "device_id_from_json")]
    pub device_id: String,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub model_number: Option<String>,
    #[serde(default)]
    pub device_software_version: Option<String>,
    #[serde(default)]
    pub ports_info: PortsInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PortsInfo {
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub outlet_number: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_v2: Option<String>,
}

#[derive(Debug, Error)]
#[error("invalid station status document: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl StationStatus {
    pub fn display_name(&self) -> String {
        self.name.join(" ")
    }

    pub fn model(&self) -> &str {
        self.model_number.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn software_version(&self) -> &str {
        self.device_software_version.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports_info.ports
    }
}

impl Port {
    /// `statusV2` wins over `status`; the result is lower-cased.
    pub fn normalized_status(&self) -> String {
        self.status_v2
            .as_deref()
            .or(self.status.as_deref())
            .unwrap_or("unknown")
            .to_lowercase()
    }
}

pub fn decode_station_status(body: &[u8]) -> Result<StationStatus, DecodeError> {
    serde_json::from_slice(body).map_err(DecodeError::from)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDeviceId {
    Text(String),
    Number(serde_json::Number),
}

fn device_id_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawDeviceId::deserialize(deserializer)? {
        RawDeviceId::Text(text) => text,
        RawDeviceId::Number(number) => number.to_string(),
    })
}
