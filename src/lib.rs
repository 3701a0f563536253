//! # s7-honeypot
//!
//! Low-interaction ICS honeypot impersonating a Siemens S7-1200 PLC.
//!
//! The honeypot exposes the two wire protocols a scanner expects to find on
//! such a device and answers with vendor-consistent responses backed by a
//! drifting process simulation:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      S7-1200 HONEYPOT                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ 0.0.0.0:102   S7comm responder                                  │
//! │   • TPKT/COTP framing, COTP CC, SZL id, Read/Write Var          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ 0.0.0.0:502   Modbus/TCP front-end                              │
//! │   • per-frame capture log, Siemens unit-id filter               │
//! │   • relays surviving frames to 127.0.0.1:1502                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ 127.0.0.1:1502   internal Modbus server                         │
//! │   • 200 holding registers + MEI-14 device identification        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Process simulation                                              │
//! │   • DB1/DB10/DB100 drift once per scan cycle                    │
//! │   • projected into the register image once per second           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything an attacker can observe (ports, periods, identity strings,
//! canned S7 responses) is a compile-time constant so the fingerprint is
//! stable across deployments.

pub mod error;
pub mod model;
pub mod modbus;
pub mod projection;
pub mod s7;
pub mod scan;
pub mod types;

// Re-exports
pub use error::{HoneypotError, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
