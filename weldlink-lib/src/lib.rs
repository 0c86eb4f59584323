//! Protocol client for the WELD-CTRL family of weld controllers.
//!
//! Talks the controller's fixed 30-byte command set over either a direct
//! serial port or a serial-to-Ethernet tunnel, discovers which endpoint
//! the device is on, and decodes its two response shapes: the telemetry
//! line and the 256-byte configuration record.

pub mod command;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod diag;
pub mod endpoint;
pub mod error;
pub mod framer;
pub mod scanner;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::WeldError;
pub use session::WelderSession;
