//! # gCAU Client
//!
//! An asynchronous client library for configuring gCAU controllers over a serial link.
//!
//! ## Overview
//!
//! The crate builds on [`spg_protocol`] for framing and on [`gcau_config`] for the
//! objects to write. It adds everything that owns a stream or a timer:
//!
//! - [`channel`]: the line channel towards a controller and its tokio implementation
//! - [`chunks`]: splitting of object writes into commands of bounded length
//! - [`session`]: login, generic requests and verified configuration writes
//! - [`discovery`]: probing every serial port of the host for a controller
//!
//! Requests on one channel are strictly serial. Every request waits for its reply or
//! the configured reply timeout before the next one is sent.
//!
//! ## Basic Usage
//!
//! ### Finding a Controller
//!
//! ```ignore
//! use gcau_client::discovery::{Discovery, DiscoveryConfig};
//!
//! let discovery = Discovery::new(ports, DiscoveryConfig::default());
//! let outcome = discovery.run().await;
//! if outcome.descriptor.is_found() {
//!     println!("Found {} on {}", outcome.descriptor.serial_number, outcome.descriptor.port_name);
//! }
//! ```
//!
//! ### Writing a Patch
//!
//! ```ignore
//! use gcau_client::session::Builder;
//!
//! let mut session = Builder::new().build(channel);
//! if session.login().await {
//!     let report = session.write_patch(patch.patch_objects()).await;
//!     println!("{} objects written", report.written);
//! }
//! ```
//!
//! ## Related Crates
//!
//! - [`spg_protocol`] - Frame encoding and decoding
//! - [`gcau_config`] - Configuration, patch and class restriction files
pub mod channel;
pub mod chunks;
pub mod discovery;
pub mod session;

pub use channel::{Channel, ChannelError, FramedChannel};
pub use chunks::{Chunk, WriteChunks};
pub use discovery::{
    ControllerDescriptor, Discovery, DiscoveryConfig, DiscoveryOutcome, PortProvider,
};
pub use session::{Session, SessionState, WriteReport};
