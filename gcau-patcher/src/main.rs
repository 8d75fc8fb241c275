//! # gCAU Patcher
//!
//! Command line front end for gCAU patch files and controllers.
//!
//! ## Overview
//!
//! The tool converts between encrypted (`.agcp`) and decoded (`.agcp0`) patch files,
//! turns configuration files (`.agc`) into patches, lists the objects a patch writes and
//! checks language files. Towards controllers it finds a controller on the serial ports
//! of the host and applies a patch after logging in.
//!
//! Key material for encrypted patches is passed with `--key` and `--iv` or through the
//! `GCAU_PATCH_KEY` and `GCAU_PATCH_IV` environment variables.
mod serial;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use clap_num::number_range;
use env_logger::Env;
use gcau_client::{
    Discovery, DiscoveryConfig, FramedChannel, PortProvider, discovery::DiscoveryOutcome,
    session::Builder,
};
use gcau_config::{ClassRestrictions, LanguageFile, PatchCipher, PatchFile, PatchObject};
use tokio_util::sync::CancellationToken;

use crate::serial::SerialPorts;

const DEFAULT_BAUD_RATE: u32 = 38400;

fn slave_number(s: &str) -> Result<u32, String> {
    number_range(s, 0, 255)
}

#[derive(clap::Args)]
struct KeyArgs {
    /// AES key as 32 hex digits
    #[arg(long, env = "GCAU_PATCH_KEY", hide_env_values = true)]
    key: Option<String>,

    /// AES initialisation vector as 32 hex digits
    #[arg(long, env = "GCAU_PATCH_IV", hide_env_values = true)]
    iv: Option<String>,
}

impl KeyArgs {
    fn cipher(&self) -> Result<Option<PatchCipher>, Box<dyn Error>> {
        match (&self.key, &self.iv) {
            (Some(key), Some(iv)) => Ok(Some(PatchCipher::from_hex(key, iv)?)),
            (None, None) => Ok(None),
            _ => Err("--key and --iv must be given together".into()),
        }
    }
}

#[derive(clap::Args)]
struct RestrictionArgs {
    /// Class restriction file (YAML)
    #[arg(short, long)]
    restrictions: Option<PathBuf>,

    /// Class version to restrict to. Defaults to the object schema of the controller.
    #[arg(long)]
    class_version: Option<u32>,
}

#[derive(clap::Args)]
struct LinkArgs {
    /// Serial port of the controller. The controller is searched on all ports if omitted.
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate of the port, or the rate to try first when searching
    #[arg(short, long)]
    baud: Option<u32>,

    #[arg(long, value_parser = slave_number)]
    slave: Option<u32>,

    #[arg(long, help = "Probing time per baud rate in milliseconds", default_value = "2000")]
    round_timeout_ms: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Decrypt an encoded patch file
    Decode {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Encrypt a decoded patch or a configuration file into an encoded patch file
    Encode {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Include attributes without value and calibration data
        #[arg(long)]
        full: bool,
    },
    /// List the objects a patch writes
    Show {
        file: PathBuf,
        #[arg(long)]
        full: bool,
        #[command(flatten)]
        restrictions: RestrictionArgs,
    },
    /// Check the records of a language file
    CheckLanguage {
        file: PathBuf,
        #[arg(long)]
        no_checksum: bool,
    },
    /// Search all serial ports for a controller
    Discover {
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Write a patch to a controller
    Apply {
        file: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
        #[command(flatten)]
        restrictions: RestrictionArgs,
        /// Controllers with old firmware need the legacy login
        #[arg(long)]
        legacy_login: bool,
        #[arg(long, help = "Reply timeout in milliseconds", default_value = "2000")]
        reply_timeout_ms: u64,
    },
}

#[derive(Parser)]
#[command(about = "Inspect, encrypt and apply gCAU patch files", long_about = None)]
struct Args {
    #[command(flatten)]
    keys: KeyArgs,

    #[clap(subcommand)]
    command: Command,
}

fn write_lines(lines: &[String], output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match output {
        Some(path) => {
            let mut text = lines.join("\n");
            text.push('\n');
            fs::write(path, text)?;
            log::info!("Wrote {}", path.display());
        }
        None => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn print_objects(objects: &[PatchObject]) {
    for object in objects {
        for attribute in object.attributes() {
            if let Some(line) = object.build_line(attribute.position) {
                println!("{}", line);
            }
        }
    }
}

fn load_restrictions(
    args: &RestrictionArgs,
    object_schema: Option<u32>,
) -> Result<Option<ClassRestrictions>, Box<dyn Error>> {
    let Some(path) = &args.restrictions else {
        return Ok(None);
    };
    let mut restrictions = ClassRestrictions::open(path)?;
    match args.class_version.or(object_schema) {
        Some(version) => {
            if !restrictions.resolve(version) {
                log::warn!("Not every class is defined for class version {}", version);
            }
        }
        None => log::warn!("No class version known, restrictions are not applied"),
    }
    Ok(Some(restrictions))
}

fn abort_on_ctrl_c(abort: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Aborting after the current round");
            abort.cancel();
        }
    });
}

async fn discover(
    link: &LinkArgs,
) -> DiscoveryOutcome<<SerialPorts as PortProvider>::Port> {
    let config = DiscoveryConfig {
        preferred_baud_rate: link.baud,
        round_timeout: Duration::from_millis(link.round_timeout_ms),
    };
    let discovery = Discovery::new(SerialPorts, config);
    abort_on_ctrl_c(discovery.abort_handle());
    discovery.run().await
}

async fn apply(
    patch: &PatchFile,
    link: &LinkArgs,
    restrictions: &RestrictionArgs,
    legacy_login: bool,
    reply_timeout: Duration,
) -> Result<(), Box<dyn Error>> {
    let (channel, slave_number, object_schema) = match &link.port {
        Some(port) => {
            let baud_rate = link.baud.unwrap_or(DEFAULT_BAUD_RATE);
            log::info!("Opening {} at {} baud", port, baud_rate);
            let channel = FramedChannel::new(SerialPorts.open(port, baud_rate)?);
            (channel, link.slave, None)
        }
        None => {
            let outcome = discover(link).await;
            let Some(channel) = outcome.channel else {
                println!("No controller found");
                return Ok(());
            };
            let descriptor = outcome.descriptor;
            (
                channel,
                link.slave.or(descriptor.slave_number),
                descriptor.object_schema,
            )
        }
    };

    let objects = match load_restrictions(restrictions, object_schema)? {
        Some(restrictions) => patch.restricted_patch_objects(&restrictions),
        None => patch.patch_objects().to_vec(),
    };

    let mut session = Builder::new()
        .reply_timeout(reply_timeout)
        .slave_number(slave_number)
        .legacy_login(legacy_login)
        .build(channel);
    if !session.login().await {
        return Err("Login failed".into());
    }
    let report = session.write_patch(&objects).await;
    println!("{} of {} objects written", report.written, objects.len());
    match report.failure {
        Some(failure) => Err(failure.to_string().into()),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cipher = args.keys.cipher()?;

    match args.command {
        Command::Decode { file, output } => {
            let patch = PatchFile::open(&file, false, cipher.as_ref())?;
            write_lines(patch.decoded_contents(), output.as_deref())?;
        }
        Command::Encode { file, output, full } => {
            let cipher = cipher.ok_or("Encoding requires --key and --iv")?;
            let patch = PatchFile::open(&file, full, Some(&cipher))?;
            let output = output.unwrap_or_else(|| file.with_extension("agcp"));
            write_lines(&patch.encoded_contents(&cipher), Some(&output))?;
        }
        Command::Show {
            file,
            full,
            restrictions,
        } => {
            let patch = PatchFile::open(&file, full, cipher.as_ref())?;
            if patch.is_outdated() {
                println!("Patch is outdated");
            }
            for line in patch.description() {
                println!("# {}", line);
            }
            match load_restrictions(&restrictions, None)? {
                Some(restrictions) => print_objects(&patch.restricted_patch_objects(&restrictions)),
                None => print_objects(patch.patch_objects()),
            }
        }
        Command::CheckLanguage { file, no_checksum } => {
            let language = LanguageFile::open(&file, !no_checksum)?;
            println!(
                "{}: language {} version {}.{}, {} records",
                language.file_name(),
                language.language_tag(),
                language.version(),
                language.sub_version(),
                language.records().len()
            );
        }
        Command::Discover { link } => {
            let outcome = discover(&link).await;
            let descriptor = outcome.descriptor;
            if descriptor.is_found() {
                println!("Port:               {}", descriptor.port_name);
                println!("Baud rate:          {}", descriptor.baud_rate);
                if let Some(slave) = descriptor.slave_number {
                    println!("Slave:              {}", slave);
                }
                println!("Serial number:      {}", descriptor.serial_number);
                println!("Controller version: {}", descriptor.controller_sw_version);
                println!("Regulator version:  {}", descriptor.regulator_sw_version);
                if let Some(schema) = descriptor.object_schema {
                    println!("Object schema:      {}", schema);
                }
                println!("Site:               {}", descriptor.site_id);
                if !descriptor.project_reference.is_empty() {
                    println!("Project:            {}", descriptor.project_reference);
                }
            } else if outcome.early_abort {
                println!("Search aborted");
            } else {
                println!("No controller found");
            }
        }
        Command::Apply {
            file,
            link,
            restrictions,
            legacy_login,
            reply_timeout_ms,
        } => {
            let patch = PatchFile::open(&file, false, cipher.as_ref())?;
            if patch.is_outdated() {
                return Err(format!("{} is outdated", patch.file_name()).into());
            }
            apply(
                &patch,
                &link,
                &restrictions,
                legacy_login,
                Duration::from_millis(reply_timeout_ms),
            )
            .await?;
        }
    }
    Ok(())
}
