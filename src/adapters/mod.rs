pub mod chargepoint_http;
pub mod mqtt;
