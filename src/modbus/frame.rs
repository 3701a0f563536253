//! MBAP framing and the Siemens unit-id acceptance policy.

use crate::error::{HoneypotError, Result};
use crate::types::RELAY_READ_SIZE;
use bytes::{Buf, BytesMut};

/// MBAP header length: transaction, protocol, length, unit.
pub const MBAP_HEADER_LEN: usize = 7;

/// Smallest frame that still carries a function code.
pub const MIN_ADU_LEN: usize = 8;

/// Modbus Encapsulated Interface transport; device identification lives here.
pub const FC_ENCAPSULATED_INTERFACE: u8 = 0x2B;

/// Unit id Siemens devices answer MEI identification requests on.
pub const UNIT_ID_MEI: u8 = 255;

/// The only slave address a real S7-1200 responds to.
pub const UNIT_ID_PLC: u8 = 1;

// =============================================================================
// ADU
// =============================================================================

/// One Modbus/TCP application data unit as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adu {
    /// Transaction ID
    pub transaction_id: u16,
    /// Protocol ID (0 for Modbus)
    pub protocol_id: u16,
    /// MBAP length field (unit id + PDU)
    pub length: u16,
    /// Unit ID
    pub unit_id: u8,
    /// Function code (first PDU byte)
    pub function_code: u8,
    /// The full frame, MBAP header included
    pub raw: Vec<u8>,
}

impl Adu {
    /// Parses one complete frame. Header fields are big-endian.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < MIN_ADU_LEN {
            return Err(HoneypotError::ShortFrame { len: raw.len() });
        }

        Ok(Self {
            transaction_id: u16::from_be_bytes([raw[0], raw[1]]),
            protocol_id: u16::from_be_bytes([raw[2], raw[3]]),
            length: u16::from_be_bytes([raw[4], raw[5]]),
            unit_id: raw[6],
            function_code: raw[7],
            raw: raw.to_vec(),
        })
    }

    /// The PDU without the MBAP header.
    pub fn pdu(&self) -> &[u8] {
        &self.raw[MBAP_HEADER_LEN..]
    }

    /// Hex rendering of the whole frame for the capture log.
    pub fn hex(&self) -> String {
        hex::encode(&self.raw)
    }
}

/// Builds a full frame around a PDU: MBAP length covers unit id + PDU.
pub fn build_adu(transaction_id: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let length = (pdu.len() + 1) as u16;
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]); // protocol id
    frame.extend_from_slice(&length.to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

// =============================================================================
// Streaming Framer
// =============================================================================

/// Incremental MBAP framer over a TCP byte stream.
///
/// Frames are delimited by the MBAP length field, so ADUs split or batched
/// by TCP segmentation come out whole.
#[derive(Debug, Default)]
pub struct AduFramer {
    buf: BytesMut,
}

impl AduFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(RELAY_READ_SIZE),
        }
    }

    /// Appends freshly received bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes still buffered; a nonzero residue at EOF is a truncated frame.
    pub fn residue(&self) -> usize {
        self.buf.len()
    }

    /// Takes the next complete frame out of the buffer, if one is there.
    ///
    /// A frame whose MBAP length is too small to carry a function code is
    /// consumed and surfaced as `ShortFrame`.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        if self.buf.len() < MBAP_HEADER_LEN {
            return None;
        }

        let length = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
        let total = 6 + length;

        if total < MIN_ADU_LEN {
            let drop_len = total.clamp(MBAP_HEADER_LEN, self.buf.len());
            self.buf.advance(drop_len);
            return Some(Err(HoneypotError::ShortFrame { len: total }));
        }

        if self.buf.len() < total {
            return None;
        }

        Some(Ok(self.buf.split_to(total).to_vec()))
    }
}

// =============================================================================
// Unit-ID Policy
// =============================================================================

/// Outcome of the Siemens unit-id policy for one inbound ADU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Relay to the internal server.
    Forward,
    /// Silently dropped; no response is synthesized.
    Drop,
}

/// Applies the Siemens unit-id acceptance rules: unit 255 passes only for
/// MEI device identification, unit 1 always passes, everything else drops.
pub fn unit_id_filter(unit_id: u8, function_code: u8) -> FilterVerdict {
    if unit_id == UNIT_ID_MEI && function_code == FC_ENCAPSULATED_INTERFACE {
        FilterVerdict::Forward
    } else if unit_id == UNIT_ID_PLC {
        FilterVerdict::Forward
    } else {
        FilterVerdict::Drop
    }
}
