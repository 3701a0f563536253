//! Shared constants and the impersonated device identity.
//!
//! Everything here is deliberately `const`: the honeypot carries no runtime
//! configuration so its fingerprint is identical on every deployment.

use std::time::Duration;

// =============================================================================
// Endpoints
// =============================================================================

/// S7comm (ISO-on-TCP) listen endpoint.
pub const S7_LISTEN_ADDR: &str = "0.0.0.0:102";

/// Modbus/TCP listen endpoint.
pub const MODBUS_LISTEN_ADDR: &str = "0.0.0.0:502";

/// Internal Modbus server endpoint. Loopback only; never exposed.
pub const INTERNAL_MODBUS_ADDR: &str = "127.0.0.1:1502";

// =============================================================================
// Timing
// =============================================================================

/// Scan driver period (one OB1 cycle of the simulated CPU).
pub const SCAN_PERIOD: Duration = Duration::from_secs(1);

/// Register projection period.
pub const PROJECTION_PERIOD: Duration = Duration::from_secs(1);

// =============================================================================
// Sizing
// =============================================================================

/// Words in the Modbus holding-register image.
pub const REGISTER_IMAGE_WORDS: usize = 200;

/// Per-receive buffer size on the relay paths.
pub const RELAY_READ_SIZE: usize = 4096;

/// Largest TPKT telegram accepted on the S7 side.
pub const MAX_TPKT_TELEGRAM: usize = 4096;

// =============================================================================
// Device Identity
// =============================================================================

/// Identity objects served through MEI-14 (function 0x2B / MEI type 0x0E),
/// keyed by the standard object id: 0x00 VendorName, 0x01 ProductCode,
/// 0x02 MajorMinorRevision, 0x04 ProductName, 0x05 ModelName.
pub static IDENTITY_OBJECTS: &[(u8, &str)] = &[
    (0x00, "SIEMENS AG"),
    (0x01, "6ES7"),
    (0x02, "4.2"),
    (0x04, "SIMATIC PLC"),
    (0x05, "S7-1200"),
];
