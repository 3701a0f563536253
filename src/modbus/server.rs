//! Internal Modbus/TCP server backing the register image.
//!
//! Terminates the loopback hop of the front-end relay. Single-slave: the
//! unit id was already enforced upstream, so it is echoed, never checked.
//! Serves the register reads and writes a scanner probes for, plus MEI-14
//! device identification with the Siemens identity strings.

use crate::error::Result;
use crate::modbus::frame::{build_adu, Adu, AduFramer, FC_ENCAPSULATED_INTERFACE};
use crate::projection::SharedRegisters;
use crate::types::{IDENTITY_OBJECTS, RELAY_READ_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

// Function codes served by the simulated device.
const FC_READ_HOLDING: u8 = 0x03;
const FC_READ_INPUT: u8 = 0x04;
const FC_WRITE_SINGLE: u8 = 0x06;
const FC_WRITE_MULTIPLE: u8 = 0x10;

/// MEI transport type for Read Device Identification.
const MEI_READ_DEVICE_ID: u8 = 0x0E;

// Modbus exception codes.
const EX_ILLEGAL_FUNCTION: u8 = 0x01;
const EX_ILLEGAL_ADDRESS: u8 = 0x02;
const EX_ILLEGAL_VALUE: u8 = 0x03;

/// Accept loop for the internal server. One bad connection never takes the
/// listener down.
pub async fn run_internal_server(listener: TcpListener, registers: SharedRegisters) {
    if let Ok(addr) = listener.local_addr() {
        info!("Internal Modbus server listening on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let registers = registers.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, registers).await {
                        debug!("Internal server connection ended: {}", e);
                    }
                });
            }
            Err(e) => error!("Internal server accept failed: {}", e),
        }
    }
}

async fn serve_connection(mut stream: TcpStream, registers: SharedRegisters) -> Result<()> {
    let mut framer = AduFramer::new();
    let mut chunk = vec![0u8; RELAY_READ_SIZE];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        framer.extend(&chunk[..n]);

        while let Some(frame) = framer.next_frame() {
            let frame = match frame {
                Ok(f) => f,
                Err(e) => {
                    warn!("Internal server dropped malformed frame: {}", e);
                    continue;
                }
            };
            let adu = Adu::parse(&frame)?;
            let pdu = respond(&adu, &registers).await;
            stream
                .write_all(&build_adu(adu.transaction_id, adu.unit_id, &pdu))
                .await?;
        }
    }
}

/// Produces the response PDU for one request.
async fn respond(adu: &Adu, registers: &SharedRegisters) -> Vec<u8> {
    let pdu = adu.pdu();
    match adu.function_code {
        FC_READ_HOLDING | FC_READ_INPUT => read_registers(adu.function_code, pdu, registers).await,
        FC_WRITE_SINGLE => write_single(pdu, registers).await,
        FC_WRITE_MULTIPLE => write_multiple(pdu, registers).await,
        FC_ENCAPSULATED_INTERFACE => device_identification(pdu),
        other => exception(other, EX_ILLEGAL_FUNCTION),
    }
}

fn exception(function_code: u8, code: u8) -> Vec<u8> {
    vec![function_code | 0x80, code]
}

/// FC 0x03 / 0x04. Input registers mirror the holding image: the simulated
/// device has a single data context.
async fn read_registers(fc: u8, pdu: &[u8], registers: &SharedRegisters) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(fc, EX_ILLEGAL_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
    if quantity == 0 || quantity > 125 {
        return exception(fc, EX_ILLEGAL_VALUE);
    }

    match registers.read_range(address, quantity).await {
        Some(values) => {
            let mut out = Vec::with_capacity(2 + values.len() * 2);
            out.push(fc);
            out.push((values.len() * 2) as u8);
            for value in values {
                out.extend_from_slice(&value.to_be_bytes());
            }
            out
        }
        None => exception(fc, EX_ILLEGAL_ADDRESS),
    }
}

/// FC 0x06. The write lands in the image until the next projection tick
/// overwrites mapped addresses; every write attempt is logged.
async fn write_single(pdu: &[u8], registers: &SharedRegisters) -> Vec<u8> {
    if pdu.len() < 5 {
        return exception(FC_WRITE_SINGLE, EX_ILLEGAL_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let value = u16::from_be_bytes([pdu[3], pdu[4]]);

    if registers.write_range(address, &[value]).await {
        info!("[WRITE] Modbus register {} set to {}", address, value);
        pdu[..5].to_vec()
    } else {
        exception(FC_WRITE_SINGLE, EX_ILLEGAL_ADDRESS)
    }
}

/// FC 0x10.
async fn write_multiple(pdu: &[u8], registers: &SharedRegisters) -> Vec<u8> {
    if pdu.len() < 6 {
        return exception(FC_WRITE_MULTIPLE, EX_ILLEGAL_VALUE);
    }
    let address = u16::from_be_bytes([pdu[1], pdu[2]]);
    let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
    let byte_count = pdu[5] as usize;

    if quantity == 0
        || quantity > 123
        || byte_count != quantity as usize * 2
        || pdu.len() < 6 + byte_count
    {
        return exception(FC_WRITE_MULTIPLE, EX_ILLEGAL_VALUE);
    }

    let values: Vec<u16> = pdu[6..6 + byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    if registers.write_range(address, &values).await {
        info!(
            "[WRITE] Modbus registers {}..={} updated",
            address,
            address + quantity - 1
        );
        let mut out = vec![FC_WRITE_MULTIPLE];
        out.extend_from_slice(&address.to_be_bytes());
        out.extend_from_slice(&quantity.to_be_bytes());
        out
    } else {
        exception(FC_WRITE_MULTIPLE, EX_ILLEGAL_ADDRESS)
    }
}

/// FC 0x2B / MEI 0x0E. The full identity is returned for every ReadDeviceId
/// code so even a basic-scope scan sees the product strings.
fn device_identification(pdu: &[u8]) -> Vec<u8> {
    if pdu.len() < 2 || pdu[1] != MEI_READ_DEVICE_ID {
        return exception(FC_ENCAPSULATED_INTERFACE, EX_ILLEGAL_FUNCTION);
    }
    let read_code = pdu.get(2).copied().unwrap_or(0x01);

    let mut out = vec![
        FC_ENCAPSULATED_INTERFACE,
        MEI_READ_DEVICE_ID,
        read_code,
        0x83, // conformity: extended identification, stream and individual access
        0x00, // no more follows
        0x00, // next object id
        IDENTITY_OBJECTS.len() as u8,
    ];
    for &(object_id, value) in IDENTITY_OBJECTS {
        out.push(object_id);
        out.push(value.len() as u8);
        out.extend_from_slice(value.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::RegisterImage;
    use std::sync::Arc;

    fn adu(unit: u8, pdu: &[u8]) -> Adu {
        Adu::parse(&build_adu(1, unit, pdu)).unwrap()
    }

    #[tokio::test]
    async fn test_read_holding_registers() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        registers.write_batch(&[(0, 225), (1, 1020)]).await;

        let resp = respond(&adu(1, &[0x03, 0x00, 0x00, 0x00, 0x02]), &registers).await;
        assert_eq!(resp, vec![0x03, 0x04, 0x00, 0xE1, 0x03, 0xFC]);
    }

    #[tokio::test]
    async fn test_read_beyond_image_is_illegal_address() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        let resp = respond(&adu(1, &[0x03, 0x00, 0xC7, 0x00, 0x02]), &registers).await;
        assert_eq!(resp, vec![0x83, EX_ILLEGAL_ADDRESS]);
    }

    #[tokio::test]
    async fn test_zero_quantity_is_illegal_value() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        let resp = respond(&adu(1, &[0x03, 0x00, 0x00, 0x00, 0x00]), &registers).await;
        assert_eq!(resp, vec![0x83, EX_ILLEGAL_VALUE]);
    }

    #[tokio::test]
    async fn test_write_single_echoes_request() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        let resp = respond(&adu(1, &[0x06, 0x00, 0x0A, 0x12, 0x34]), &registers).await;
        assert_eq!(resp, vec![0x06, 0x00, 0x0A, 0x12, 0x34]);
        assert_eq!(registers.read_range(10, 1).await, Some(vec![0x1234]));
    }

    #[tokio::test]
    async fn test_write_multiple_updates_the_image() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        let resp = respond(
            &adu(1, &[0x10, 0x00, 0x14, 0x00, 0x02, 0x04, 0x00, 0x01, 0x00, 0x02]),
            &registers,
        )
        .await;
        assert_eq!(resp, vec![0x10, 0x00, 0x14, 0x00, 0x02]);
        assert_eq!(registers.read_range(20, 2).await, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_unsupported_function_is_illegal_function() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        let resp = respond(&adu(1, &[0x01, 0x00, 0x00, 0x00, 0x01]), &registers).await;
        assert_eq!(resp, vec![0x81, EX_ILLEGAL_FUNCTION]);
    }

    #[tokio::test]
    async fn test_device_identification_carries_all_strings() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        let resp = respond(&adu(255, &[0x2B, 0x0E, 0x01, 0x00]), &registers).await;

        assert_eq!(&resp[..3], &[0x2B, 0x0E, 0x01]);
        assert_eq!(resp[6], 5); // object count
        for needle in [&b"SIEMENS AG"[..], b"6ES7", b"4.2", b"SIMATIC PLC", b"S7-1200"] {
            assert!(
                resp.windows(needle.len()).any(|w| w == needle),
                "missing identity string"
            );
        }
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let registers: SharedRegisters = Arc::new(RegisterImage::new());
        registers.write_batch(&[(0, 0x00AA)]).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_internal_server(listener, registers));

        let mut sock = TcpStream::connect(addr).await.unwrap();
        sock.write_all(&build_adu(9, 1, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .await
            .unwrap();

        let mut resp = [0u8; 11];
        sock.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp[..2], [0x00, 0x09]); // transaction echoed
        assert_eq!(resp[6..], [0x01, 0x03, 0x02, 0x00, 0xAA]);
    }
}
