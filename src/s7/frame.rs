//! TPKT/COTP framing and the canned S7 responses.
//!
//! The responder speaks just enough ISO-on-TCP to satisfy the requests a
//! scanner issues against an S7-1200. Every response is byte-exact: the
//! fingerprint matters more than protocol completeness.

// Wire constants (RFC 1006 + ISO 8073 class 0 + S7).
//
//  TPKT
//      [0]    RFC 1006 ID          0x03
//      [1]    Reserved             0x00
//      [2]    HI telegram length   Variable
//      [3]    LO telegram length   Variable
//  COTP (data TPDU)
//      [4]    Length               0x02
//      [5]    PDU type             0xF0
//      [6]    EOT                  0x80

/// RFC 1006 version byte.
pub const TPKT_VERSION: u8 = 0x03;

/// TPKT header length.
pub const TPKT_HEADER_LEN: usize = 4;

/// COTP data header: length 2, PDU type 0xF0, EOT set.
pub const COTP_DATA_HEADER: [u8; 3] = [0x02, 0xF0, 0x80];

/// COTP Connection Request TPDU type.
pub const COTP_CONNECTION_REQUEST: u8 = 0xE0;

/// COTP Connection Confirm TPDU type.
pub const COTP_CONNECTION_CONFIRM: u8 = 0xD0;

/// S7 ROSCTR value for a JOB request.
pub const S7_ROSCTR_JOB: u8 = 0x01;

/// COTP Connection Confirm payload.
pub const COTP_CC_PAYLOAD: [u8; 2] = [COTP_CONNECTION_CONFIRM, 0x00];

/// Canned SZL 0x00B4 answer: module identification carrying a plausible
/// serial and firmware id. Ack-Data, one record of length 0x0A.
pub const SZL_SYSTEM_ID: [u8; 24] = [
    0x32, 0x03, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x0C, //
    0x00, 0xB4, // SZL id: module identification
    0x00, 0x01, // index
    0x00, 0x0A, // record length
    0x11, 0x22, 0x33, 0x44, // module serial
    0x12, 0x34, 0x12, 0x34, // firmware id
];

/// Canned Read Var success PDU.
pub const READ_VAR_OK: [u8; 14] = [
    0x32, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, //
    0xFF, 0x04, 0x01, 0x00, 0x02, 0x00, 0x00,
];

/// Canned Write Var success PDU.
pub const WRITE_VAR_OK: [u8; 8] = [0x32, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0xFF];

/// Wraps an S7 payload in the TPKT + COTP data envelope.
///
/// The length field covers the whole telegram: TPKT(4) + COTP(3) + payload.
pub fn envelope(payload: &[u8]) -> Vec<u8> {
    let length = TPKT_HEADER_LEN + COTP_DATA_HEADER.len() + payload.len();
    let mut out = Vec::with_capacity(length);
    out.push(TPKT_VERSION);
    out.push(0x00);
    out.push((length >> 8) as u8);
    out.push((length & 0xFF) as u8);
    out.extend_from_slice(&COTP_DATA_HEADER);
    out.extend_from_slice(payload);
    out
}

/// What one inbound TPDU asks of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S7Request {
    /// COTP connection request; answer with Connection Confirm.
    CotpConnect,
    /// SZL system identification job.
    SzlRead,
    /// Read Var job.
    ReadVar,
    /// Write Var job; high-signal for the capture log.
    WriteVar,
    /// Anything else; stay silent.
    Unknown,
}

/// Classifies one TPDU.
///
/// Offsets follow what S7 scanners put on the wire: ROSCTR at byte 3 of the
/// TPDU, the SZL selector at bytes 10..12, the read/write discriminator at
/// byte 11. A JOB too short to reach those offsets is unknown.
pub fn classify(tpdu: &[u8]) -> S7Request {
    match tpdu.first() {
        Some(&COTP_CONNECTION_REQUEST) => S7Request::CotpConnect,
        Some(_) if tpdu.len() >= 12 && tpdu[3] == S7_ROSCTR_JOB => {
            if tpdu[10..12] == [0x00, 0x01] {
                S7Request::SzlRead
            } else if tpdu[11] == 0x04 {
                S7Request::ReadVar
            } else if tpdu[11] == 0x05 {
                S7Request::WriteVar
            } else {
                S7Request::Unknown
            }
        }
        _ => S7Request::Unknown,
    }
}
