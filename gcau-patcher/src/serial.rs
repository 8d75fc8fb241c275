use std::io;

use gcau_client::PortProvider;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// The serial ports of the host
#[derive(Debug, Default)]
pub struct SerialPorts;

impl PortProvider for SerialPorts {
    type Port = SerialStream;

    fn port_names(&self) -> Vec<String> {
        match tokio_serial::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(err) => {
                log::error!("Cannot list serial ports: {}", err);
                Vec::new()
            }
        }
    }

    fn open(&self, name: &str, baud_rate: u32) -> io::Result<SerialStream> {
        let port = tokio_serial::new(name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::Two)
            .open_native_async()?;
        Ok(port)
    }
}
