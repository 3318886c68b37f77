//! Rebound - check how a network stack delivers ICMP errors to UDP sockets.
//!
//! A host must pass the ICMP errors it receives for a UDP flow up to the socket owning that flow
//! (RFC 1122 section 4.1.3.3). This crate drives a device under test (DUT) through real socket
//! calls while a packet level peer answers the DUT's datagrams with crafted ICMP errors, and then
//! checks which socket call observes the error, with which error code and how often.
//!
//! Every combination of [`ConnectionMode`], [`IcmpErrorKind`] and [`DetectionMethod`] is a
//! [`Scenario`], and the full set is a [`Matrix`]. A [`Harness`] runs the scenarios against a
//! [`Testbed`] and produces one [`ScenarioReport`] for each.
//!
//! # Example
//!
//! The following example runs every scenario against the host network stack, with the peers
//! behind a tun device (requires the privilege to create one):
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use rebound_core::{Builder, Harness, LocalTestbed, Matrix};
//!
//! let config = Builder::new().build()?;
//! let testbed = LocalTestbed::start(&config)?;
//! let reports = Harness::new(testbed, config).run(&Matrix::all());
//! for report in reports {
//!     println!("{}: {}", report.scenario, report.verdict);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # See Also
//!
//! - [`Builder`] - Build a [`HarnessConfig`].
//! - [`Matrix::filter`] - Select scenarios by name.
//! - [`Harness::run_with`] - Run scenarios with a handler called as each completes.
//! - [`Dut`] - Implement to test a device other than the local host.
#![warn(clippy::all, clippy::pedantic, clippy::nursery, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::option_if_let_else,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]
#![deny(unsafe_code)]

mod builder;
mod config;
mod dut;
mod error;
mod matrix;
mod outcome;
mod peer;
mod runner;
mod strategy;
mod types;

/// Packet construction and the peer network.
pub mod net;

pub use builder::Builder;
pub use config::{defaults, HarnessConfig};
pub use dut::{CallContext, CallResult, Dut, DutSession, DutSocket, LocalDut};
pub use error::{Error, IoError, IoOperation, IoResult, Result};
pub use matrix::{Matrix, Scenario};
pub use outcome::{Failure, Observed, ScenarioReport, Step, Verdict};
pub use peer::{CapturedDatagram, Link, PeerConnection, UdpFields};
#[cfg(any(target_os = "macos", target_os = "linux"))]
pub use runner::LocalTestbed;
pub use runner::{Harness, Testbed};
pub use strategy::Detection;
pub use types::{
    ConnectionMode, DetectionMethod, ExpectedOutcome, IcmpErrorKind, Port, SocketHandle,
    TransportProtocol,
};
