//! Topic and identifier naming. Every name is derived only from the
//! discovery prefix, the station device id and the outlet number, so a
//! given port always lands on the same topics across cycles.

pub const STATE_TOPIC_ROOT: &str = "chargepoint";
const STATION_PAGE_BASE: &str = "https://driver.chargepoint.com/stations";

pub fn device_object_id(device_id: &str) -> String {
    format!("chargepoint_{device_id}")
}

pub fn port_object_id(device_id: &str, outlet: i64) -> String {
    format!("chargepoint_{device_id}_port{outlet}")
}

pub fn discovery_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}/device/{}/config", device_object_id(device_id))
}

pub fn port_state_topic(device_id: &str, outlet: i64) -> String {
    format!("{STATE_TOPIC_ROOT}/{device_id}/port/{outlet}/state")
}

pub fn port_availability_topic(device_id: &str, outlet: i64) -> String {
    format!("{STATE_TOPIC_ROOT}/{device_id}/port/{outlet}/availability")
}

pub fn station_page_url(device_id: &str) -> String {
    format!("{STATION_PAGE_BASE}/{device_id}")
}
