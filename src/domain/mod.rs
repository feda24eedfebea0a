pub mod discovery;
pub mod models;
pub mod port_state;
pub mod station_status;
pub mod topics;
