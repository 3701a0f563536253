//! Modbus/TCP front-end: the attacker-facing inline proxy on port 502.
//!
//! Every inbound frame is parsed and logged before the Siemens unit-id
//! policy decides whether it reaches the internal server. Dropped frames get
//! no reply at all; a real S7-1200 is just as silent.

use crate::error::{HoneypotError, Result};
use crate::modbus::frame::{unit_id_filter, Adu, AduFramer, FilterVerdict};
use crate::types::RELAY_READ_SIZE;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-session relay counters, logged at teardown.
#[derive(Debug, Default)]
struct RelayMetrics {
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

/// Accept loop for the attacker-facing listener.
///
/// `upstream` is the internal server endpoint; tests point it at an
/// ephemeral port.
pub async fn run_proxy(listener: TcpListener, upstream: SocketAddr) {
    if let Ok(addr) = listener.local_addr() {
        info!("Modbus/TCP honeypot listening on {}", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, upstream));
            }
            Err(e) => error!("Modbus accept failed: {}", e),
        }
    }
}

async fn handle_connection(attacker: TcpStream, peer: SocketAddr, upstream: SocketAddr) {
    let session = Uuid::new_v4();
    info!("[MODBUS] Connection from {} (session {})", peer, session);

    let internal = match TcpStream::connect(upstream).await {
        Ok(stream) => stream,
        Err(e) => {
            // No retry: the attacker will reconnect, and the dropped socket
            // closes their side.
            let err = HoneypotError::UpstreamConnect {
                addr: upstream.to_string(),
                reason: e.to_string(),
            };
            error!("{}", err);
            return;
        }
    };

    let metrics = Arc::new(RelayMetrics::default());
    let (attacker_rd, attacker_wr) = attacker.into_split();
    let (internal_rd, internal_wr) = internal.into_split();

    // Either direction ending tears the whole session down: select! drops
    // the other future, and with it the remaining socket halves.
    tokio::select! {
        res = relay_inbound(attacker_rd, internal_wr, peer, metrics.clone()) => {
            if let Err(e) = res {
                debug!("[MODBUS] inbound relay for {} ended: {}", peer, e);
            }
        }
        res = relay_outbound(internal_rd, attacker_wr, peer, metrics.clone()) => {
            if let Err(e) = res {
                debug!("[MODBUS] outbound relay for {} ended: {}", peer, e);
            }
        }
    }

    info!(
        "[MODBUS] Session {} closed: {} forwarded, {} dropped, {} bytes in, {} bytes out",
        session,
        metrics.frames_forwarded.load(Ordering::Relaxed),
        metrics.frames_dropped.load(Ordering::Relaxed),
        metrics.bytes_in.load(Ordering::Relaxed),
        metrics.bytes_out.load(Ordering::Relaxed),
    );
}

/// Attacker → internal server: parse, log, filter, forward in arrival order.
async fn relay_inbound(
    mut from_attacker: OwnedReadHalf,
    mut to_internal: OwnedWriteHalf,
    peer: SocketAddr,
    metrics: Arc<RelayMetrics>,
) -> Result<()> {
    let mut framer = AduFramer::new();
    let mut chunk = vec![0u8; RELAY_READ_SIZE];

    loop {
        let n = from_attacker.read(&mut chunk).await?;
        if n == 0 {
            if framer.residue() > 0 {
                warn!(
                    "[MODBUS] {} short frame ({} bytes), dropped",
                    peer,
                    framer.residue()
                );
            }
            return Ok(());
        }
        metrics.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
        framer.extend(&chunk[..n]);

        while let Some(frame) = framer.next_frame() {
            let frame = match frame {
                Ok(f) => f,
                Err(e) => {
                    warn!("[MODBUS] {} {}, dropped", peer, e);
                    metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            let adu = Adu::parse(&frame)?;

            info!(
                "[MODBUS] {} request txn={} proto={} len={} unit={} fc=0x{:02X} raw={}",
                peer,
                adu.transaction_id,
                adu.protocol_id,
                adu.length,
                adu.unit_id,
                adu.function_code,
                adu.hex()
            );

            match unit_id_filter(adu.unit_id, adu.function_code) {
                FilterVerdict::Forward => {
                    to_internal.write_all(&adu.raw).await?;
                    metrics.frames_forwarded.fetch_add(1, Ordering::Relaxed);
                }
                FilterVerdict::Drop => {
                    warn!("UnitID {} ignored (Siemens behavior)", adu.unit_id);
                    metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Internal server → attacker: log response headers, copy bytes through.
async fn relay_outbound(
    mut from_internal: OwnedReadHalf,
    mut to_attacker: OwnedWriteHalf,
    peer: SocketAddr,
    metrics: Arc<RelayMetrics>,
) -> Result<()> {
    let mut framer = AduFramer::new();
    let mut chunk = vec![0u8; RELAY_READ_SIZE];

    loop {
        let n = from_internal.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        framer.extend(&chunk[..n]);

        while let Some(frame) = framer.next_frame() {
            let frame = match frame {
                Ok(f) => f,
                // The internal server does not emit malformed frames; skip
                // rather than kill the session if it ever does.
                Err(e) => {
                    warn!("[MODBUS] {} malformed response frame: {}", peer, e);
                    continue;
                }
            };
            if let Ok(adu) = Adu::parse(&frame) {
                info!(
                    "[MODBUS] {} response txn={} proto={} len={} unit={} fc=0x{:02X} raw={}",
                    peer,
                    adu.transaction_id,
                    adu.protocol_id,
                    adu.length,
                    adu.unit_id,
                    adu.function_code,
                    adu.hex()
                );
            }
            to_attacker.write_all(&frame).await?;
            metrics.bytes_out.fetch_add(frame.len() as u64, Ordering::Relaxed);
        }
    }
}
