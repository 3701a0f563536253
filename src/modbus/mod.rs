//! Modbus/TCP side of the honeypot.
//!
//! Three pieces:
//! - [`frame`]: MBAP codec, streaming framer and the Siemens unit-id policy
//! - [`proxy`]: the attacker-facing inline proxy on port 502
//! - [`server`]: the internal Modbus server on loopback:1502
//!
//! The front-end never answers protocol requests itself: it parses, logs and
//! filters, then relays surviving frames to the internal server, which is
//! the only component that encodes Modbus responses.

pub mod frame;
pub mod proxy;
pub mod server;
