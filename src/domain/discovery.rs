//! Home Assistant device discovery payload. Keys use the abbreviated form
//! Home Assistant accepts for device-based discovery (`dev`, `o`, `cmps`).

use serde::{Serialize, Serializer};

use crate::domain::models::MqttMessage;
use crate::domain::station_status::StationStatus;
use crate::domain::topics::{
    device_object_id, discovery_topic, port_availability_topic, port_object_id, port_state_topic,
    station_page_url,
};

pub const MANUFACTURER: &str = "ChargePoint";
pub const ORIGIN_NAME: &str = "chargepoint_mqtt_http";
pub const ORIGIN_SW_VERSION: &str = "1.0";

const COMPONENT_PLATFORM: &str = "binary_sensor";
const COMPONENT_DEVICE_CLASS: &str = "plug";
const COMPONENT_ICON: &str = "mdi:ev-station";

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRecord {
    pub topic: String,
    pub payload: DiscoveryPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryPayload {
    #[serde(rename = "dev")]
    pub device: DeviceInfo,
    #[serde(rename = "o")]
    pub origin: OriginInfo,
    #[serde(rename = "cmps", serialize_with = "components_as_map")]
    pub components: Vec<(String, Component)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub ids: String,
    pub name: String,
    #[serde(rename = "mf")]
    pub manufacturer: String,
    #[serde(rename = "mdl")]
    pub model: String,
    #[serde(rename = "sw")]
    pub sw_version: String,
    #[serde(rename = "sn")]
    pub serial_number: String,
    pub configuration_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OriginInfo {
    pub name: String,
    #[serde(rename = "sw")]
    pub sw_version: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Component {
    #[serde(rename = "p")]
    pub platform: String,
    pub name: String,
    pub device_class: String,
    pub icon: String,
    #[serde(rename = "stat_t")]
    pub state_topic: String,
    #[serde(rename = "avty_t")]
    pub availability_topic: String,
    #[serde(rename = "uniq_id")]
    pub unique_id: String,
    pub object_id: String,
}

impl DiscoveryRecord {
    pub fn to_message(&self) -> Result<MqttMessage, serde_json::Error> {
        let payload = serde_json::to_string(&self.payload)?;
        Ok(MqttMessage::retained(self.topic.clone(), payload))
    }
}

pub fn build_discovery(status: &StationStatus, prefix: &str) -> DiscoveryRecord {
    let device_id = status.device_id.as_str();

    let device = DeviceInfo {
        ids: device_object_id(device_id),
        name: status.display_name(),
        manufacturer: MANUFACTURER.to_string(),
        model: status.model().to_string(),
        sw_version: status.software_version().to_string(),
        serial_number: device_id.to_string(),
        configuration_url: station_page_url(device_id),
    };

    let origin = OriginInfo {
        name: ORIGIN_NAME.to_string(),
        sw_version: ORIGIN_SW_VERSION.to_string(),
        url: station_page_url(device_id),
    };

    let mut components: Vec<(String, Component)> = Vec::with_capacity(status.ports().len());
    for port in status.ports() {
        let outlet = port.outlet_number;
        let object_id = port_object_id(device_id, outlet);
        let component = Component {
            platform: COMPONENT_PLATFORM.to_string(),
            name: format!("Port {outlet}"),
            device_class: COMPONENT_DEVICE_CLASS.to_string(),
            icon: COMPONENT_ICON.to_string(),
            state_topic: port_state_topic(device_id, outlet),
            availability_topic: port_availability_topic(device_id, outlet),
            unique_id: object_id.clone(),
            object_id: object_id.clone(),
        };

        // A repeated outlet keeps its first position; the later entry wins.
        match components.iter().position(|(key, _)| *key == object_id) {
            Some(index) => components[index].1 = component,
            None => components.push((object_id, component)),
        }
    }

    DiscoveryRecord {
        topic: discovery_topic(prefix, device_id),
        payload: DiscoveryPayload {
            device,
            origin,
            components,
        },
    }
}

fn components_as_map<S>(
    components: &[(String, Component)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(components.iter().map(|(key, component)| (key, component)))
}
