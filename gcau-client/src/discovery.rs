//! Finding a controller on one of the serial ports of the host.
//!
//! Every round opens all ports at one baud rate and probes them concurrently with a
//! task per port. The coordinator owns the single round timer. The first port that
//! answers the probe with `ECHO` and then the registry request with `REGISTRY` wins;
//! its channel is handed back open and every other port is closed. When the timer
//! fires, all ports are closed and the next baud rate of the ladder is tried.
use std::{io, time::Duration};

use spg_protocol::{
    ParsedFrame,
    codec::{decode_value, parse_frame},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::channel::{Channel, FramedChannel};

/// Baud rates tried when no preference matches, in this order
pub const BAUD_RATES: [u32; 7] = [38400, 19200, 9600, 4800, 2400, 1200, 115200];

const PROBE: &str = "@\r";

/// Minimum number of fields of a usable `REGISTRY` reply
const REGISTRY_FIELDS: usize = 10;

/// Schema from which the registry carries a project reference
const PROJECT_REFERENCE_SCHEMA: u32 = 11;

/// The order in which baud rates are tried.
///
/// A `preferred` rate is tried first if it is one of [BAUD_RATES]. Other values are ignored.
pub fn baud_rate_ladder(preferred: Option<u32>) -> Vec<u32> {
    let mut ladder = Vec::with_capacity(BAUD_RATES.len());
    if let Some(preferred) = preferred.filter(|rate| BAUD_RATES.contains(rate)) {
        ladder.push(preferred);
    }
    ladder.extend(BAUD_RATES.iter().filter(|&&rate| Some(rate) != preferred));
    ladder
}

/// Source of the ports to probe.
pub trait PortProvider {
    type Port: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn port_names(&self) -> Vec<String>;

    /// Opens `name` with 8 data bits, no parity and two stop bits.
    fn open(&self, name: &str, baud_rate: u32) -> io::Result<Self::Port>;
}

/// Identity of a discovered controller, as reported by its registry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControllerDescriptor {
    pub port_name: String,
    pub baud_rate: u32,
    pub slave_number: Option<u32>,
    pub controller_sw_version: String,
    pub regulator_sw_version: String,
    pub language_schema: Option<u32>,
    pub object_schema: Option<u32>,
    pub serial_number: String,
    pub local_language: String,
    pub modbus_table_version: Option<u32>,
    pub site_id: String,
    /// Empty for object schemas below 11
    pub project_reference: String,
}

fn number(field: Option<&str>) -> Option<u32> {
    field.and_then(|f| f.trim().parse().ok())
}

fn text(field: Option<&str>) -> String {
    field.unwrap_or_default().to_owned()
}

impl ControllerDescriptor {
    /// The descriptor reported when no controller answered
    pub fn not_found() -> ControllerDescriptor {
        ControllerDescriptor {
            port_name: String::new(),
            baud_rate: 0,
            slave_number: None,
            controller_sw_version: "0".to_owned(),
            regulator_sw_version: "0".to_owned(),
            language_schema: None,
            object_schema: None,
            serial_number: String::new(),
            local_language: String::new(),
            modbus_table_version: None,
            site_id: String::new(),
            project_reference: String::new(),
        }
    }

    /// Reads the fields of a `/RCFG/REGISTRY/...` reply.
    pub fn from_registry(
        port_name: &str,
        baud_rate: u32,
        slave_number: Option<u32>,
        frame: &ParsedFrame,
    ) -> ControllerDescriptor {
        let object_schema = number(frame.field(5));
        let project_reference = match object_schema {
            Some(schema) if schema >= PROJECT_REFERENCE_SCHEMA => {
                frame.field(21).map(decode_value).unwrap_or_default()
            }
            _ => String::new(),
        };
        ControllerDescriptor {
            port_name: port_name.to_owned(),
            baud_rate,
            slave_number,
            controller_sw_version: text(frame.field(2)),
            regulator_sw_version: text(frame.field(3)),
            language_schema: number(frame.field(4)),
            object_schema,
            serial_number: text(frame.field(6)),
            local_language: text(frame.field(7)),
            modbus_table_version: number(frame.field(8)),
            site_id: frame.field(9).map(decode_value).unwrap_or_default(),
            project_reference,
        }
    }

    pub fn is_found(&self) -> bool {
        !self.port_name.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Rate tried first
    pub preferred_baud_rate: Option<u32>,
    /// Duration of one probing round per baud rate
    pub round_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            preferred_baud_rate: None,
            round_timeout: Duration::from_millis(2000),
        }
    }
}

/// Result of a discovery run. Not finding a controller is not an error.
#[derive(Debug)]
pub struct DiscoveryOutcome<T> {
    pub descriptor: ControllerDescriptor,
    /// The open channel to the found controller
    pub channel: Option<FramedChannel<T>>,
    /// Set if the run was aborted
    pub early_abort: bool,
}

impl<T> DiscoveryOutcome<T> {
    fn not_found(early_abort: bool) -> DiscoveryOutcome<T> {
        DiscoveryOutcome {
            descriptor: ControllerDescriptor::not_found(),
            channel: None,
            early_abort,
        }
    }
}

/// A port that answered both the probe and the registry request
#[derive(Debug)]
struct Detection<T> {
    port_name: String,
    slave_number: u32,
    frame: ParsedFrame,
    channel: FramedChannel<T>,
}

enum Round<T> {
    Found(Detection<T>),
    Timeout,
    Aborted,
}

pub struct Discovery<P: PortProvider> {
    provider: P,
    config: DiscoveryConfig,
    abort: CancellationToken,
}

impl<P: PortProvider> Discovery<P> {
    pub fn new(provider: P, config: DiscoveryConfig) -> Discovery<P> {
        Discovery {
            provider,
            config,
            abort: CancellationToken::new(),
        }
    }

    /// Cancelling the returned token aborts the run at the end of the current round.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub async fn run(&self) -> DiscoveryOutcome<P::Port> {
        for baud_rate in baud_rate_ladder(self.config.preferred_baud_rate) {
            if self.abort.is_cancelled() {
                break;
            }
            match self.round(baud_rate).await {
                Round::Found(detection) => {
                    let descriptor = ControllerDescriptor::from_registry(
                        &detection.port_name,
                        baud_rate,
                        Some(detection.slave_number),
                        &detection.frame,
                    );
                    log::info!(
                        "Found controller {} (slave {}) on {} at {} baud",
                        descriptor.serial_number,
                        detection.slave_number,
                        descriptor.port_name,
                        baud_rate
                    );
                    return DiscoveryOutcome {
                        descriptor,
                        channel: Some(detection.channel),
                        early_abort: false,
                    };
                }
                Round::Aborted => break,
                Round::Timeout => log::debug!("No controller answered at {} baud", baud_rate),
            }
        }
        let early_abort = self.abort.is_cancelled();
        if early_abort {
            log::info!("Discovery aborted");
        } else {
            log::info!("No controller found");
        }
        DiscoveryOutcome::not_found(early_abort)
    }

    async fn round(&self, baud_rate: u32) -> Round<P::Port> {
        let names = self.provider.port_names();
        log::info!("Probing {} ports at {} baud", names.len(), baud_rate);
        let (detections, mut detected) = mpsc::channel(names.len().max(1));
        let mut probes = JoinSet::new();
        for name in names {
            match self.provider.open(&name, baud_rate) {
                Ok(port) => {
                    probes.spawn(probe(name, FramedChannel::new(port), detections.clone()));
                }
                Err(err) => log::debug!("Cannot open {}: {}", name, err),
            }
        }
        drop(detections);

        let timer = tokio::time::sleep(self.config.round_timeout);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => break,
                detection = detected.recv() => match detection {
                    Some(_) if self.abort.is_cancelled() => {}
                    Some(detection) => {
                        // Closes every other port
                        probes.abort_all();
                        return Round::Found(detection);
                    }
                    None => {
                        // Every probe ended, the round still lasts until the timer fires
                        (&mut timer).await;
                        break;
                    }
                },
            }
        }
        if self.abort.is_cancelled() {
            Round::Aborted
        } else {
            Round::Timeout
        }
    }
}

/// Probes one port until it identifies itself, fails or is aborted.
async fn probe<T: AsyncRead + AsyncWrite + Unpin + Send>(
    port_name: String,
    mut channel: FramedChannel<T>,
    detections: mpsc::Sender<Detection<T>>,
) {
    if let Err(err) = channel.send(PROBE).await {
        log::debug!("{}: {}", port_name, err);
        return;
    }
    let mut slave_number = None;
    loop {
        let line = match channel.read_line().await {
            Ok(line) => line,
            Err(err) => {
                log::trace!("{}: {}", port_name, err);
                return;
            }
        };
        let frame = parse_frame(&line, true);
        if !frame.is_valid() {
            continue;
        }
        if frame.field(0) == Some("ECHO") {
            let Some(slave) = number(frame.field(1)) else {
                continue;
            };
            log::debug!("{}: echo from slave {}", port_name, slave);
            slave_number = Some(slave);
            let request = format!("@{}&1/RCFG/REGISTRY\r", slave);
            if let Err(err) = channel.send(&request).await {
                log::debug!("{}: {}", port_name, err);
                return;
            }
        } else if frame.field(1) == Some("REGISTRY") && frame.fields().len() >= REGISTRY_FIELDS {
            let Some(slave_number) = slave_number else {
                continue;
            };
            let detection = Detection {
                port_name,
                slave_number,
                frame,
                channel,
            };
            // The coordinator is gone once another port won or the round ended
            let _ = detections.send(detection).await;
            return;
        }
    }
}
