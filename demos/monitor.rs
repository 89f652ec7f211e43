//! Example that opens a Pika serial link and monitors incoming frames.

use pika_serial::link::Link;
use simple_logger::SimpleLogger;
use std::{thread, time::Duration};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable logging
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    // Usage: monitor [PORT] [SECONDS]
    let mut args = std::env::args().skip(1);
    let port_path = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let seconds: u64 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(5);

    // Open the port, print every frame and ask the device to identify itself.
    let mut link = Link::open_serial(&port_path)?;
    link.subscribe(|frame| println!("{frame}"));
    link.send_device_info_command()?;

    thread::sleep(Duration::from_secs(seconds));
    link.disconnect();

    let stats = link.stats();
    println!(
        "received {} frames ({} bytes), dropped {}, {} buffer overflows",
        stats.frames_received(),
        stats.bytes_received(),
        stats.frames_dropped(),
        stats.buffer_overflows(),
    );
    Ok(())
}
