use seamodem::{CONFIGURE_TIMEOUT, ModemBuilder, ModemLink, Role};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let role: Role = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "a".to_string())
        .parse()?;
    let mut modem = ModemBuilder::new().with_serial(&port).build()?;

    if !modem.connect()? {
        return Err("modem did not respond to connect handshake".into());
    }
    println!("payload size: {:?}", modem.payload_size());
    println!(
        "configure {}/4: {:?}",
        role,
        modem.cmd_configure(role, 4, CONFIGURE_TIMEOUT)?
    );
    println!("queue length: {:?}", modem.cmd_get_queue_length()?);
    println!("diagnostic: {:?}", modem.cmd_get_diagnostic()?);

    Ok(())
}
