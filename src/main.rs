fn main() {
    if let Err(err) = chargepoint_mqtt::app::run() {
        eprintln!("chargepoint_mqtt failed: {err}");
        std::process::exit(1);
    }
}
