//! S7comm responder: the ISO-on-TCP face of the honeypot on port 102.
//!
//! Per connection, a minimal TPKT/COTP/S7 state machine answers the four
//! request classes a scanner issues (COTP connect, SZL identification,
//! Read Var, Write Var) and logs everything else without replying. The
//! connection stays open across requests until the peer closes it.

pub mod frame;

use crate::error::{HoneypotError, Result};
use crate::types::MAX_TPKT_TELEGRAM;
use frame::{
    classify, envelope, S7Request, COTP_CC_PAYLOAD, READ_VAR_OK, SZL_SYSTEM_ID, TPKT_VERSION,
    WRITE_VAR_OK,
};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Accept loop for the S7comm listener.
pub async fn run_responder(listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        info!("S7Comm Server listening on {}...", addr);
    }

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(async move {
                    let session = Uuid::new_v4();
                    info!("[S7] Connection from {} (session {})", peer, session);
                    if let Err(e) = handle_connection(stream, peer).await {
                        error!("S7 handler error for {}: {}", peer, e);
                    }
                });
            }
            Err(e) => error!("S7 accept failed: {}", e),
        }
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let mut header = [0u8; 4];

    loop {
        // Telegram boundary: a clean close lands here.
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        if header[0] != TPKT_VERSION {
            warn!("Non-TPKT traffic from {}", peer);
            return Ok(());
        }

        let size = usize::from(u16::from_be_bytes([header[2], header[3]]));
        if size < 5 || size > MAX_TPKT_TELEGRAM {
            return Err(HoneypotError::BadTelegramLength { declared: size });
        }

        let mut tpdu = vec![0u8; size - 4];
        stream.read_exact(&mut tpdu).await?;

        info!("[RAW] {} -> {}{}", peer, hex::encode(header), hex::encode(&tpdu));

        match classify(&tpdu) {
            S7Request::CotpConnect => {
                info!("[COTP] Connection Request from {}", peer);
                stream.write_all(&envelope(&COTP_CC_PAYLOAD)).await?;
            }
            S7Request::SzlRead => {
                info!("[S7] JOB from {}", peer);
                stream.write_all(&envelope(&SZL_SYSTEM_ID)).await?;
            }
            S7Request::ReadVar => {
                info!("[S7] JOB from {}", peer);
                stream.write_all(&envelope(&READ_VAR_OK)).await?;
            }
            S7Request::WriteVar => {
                info!("[S7] JOB from {}", peer);
                info!("[WRITE] S7 Write detected from {}", peer);
                stream.write_all(&envelope(&WRITE_VAR_OK)).await?;
            }
            S7Request::Unknown => {
                info!("[S7] Unknown S7Comm payload received");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn start_responder() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_responder(listener));
        addr
    }

    /// TPKT telegram around a raw TPDU.
    fn telegram(tpdu: &[u8]) -> Vec<u8> {
        let size = (4 + tpdu.len()) as u16;
        let mut out = vec![TPKT_VERSION, 0x00];
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(tpdu);
        out
    }

    fn job_tpdu(byte10: u8, byte11: u8) -> Vec<u8> {
        let mut tpdu = vec![0x02, 0xF0, 0x80, 0x01];
        tpdu.resize(10, 0x00);
        tpdu.push(byte10);
        tpdu.push(byte11);
        tpdu
    }

    #[tokio::test]
    async fn test_cotp_connect_then_jobs_on_one_connection() {
        let addr = start_responder().await;
        let mut sock = TcpStream::connect(addr).await.unwrap();

        // COTP connection request -> connection confirm.
        sock.write_all(&telegram(&[0xE0, 0x00, 0x00, 0x00])).await.unwrap();
        let mut cc = [0u8; 9];
        sock.read_exact(&mut cc).await.unwrap();
        assert_eq!(cc, [0x03, 0x00, 0x00, 0x09, 0x02, 0xF0, 0x80, 0xD0, 0x00]);

        // Read Var on the same connection.
        sock.write_all(&telegram(&job_tpdu(0x00, 0x04))).await.unwrap();
        let mut read_var = [0u8; 21];
        sock.read_exact(&mut read_var).await.unwrap();
        assert_eq!(read_var[..4], [0x03, 0x00, 0x00, 0x15]);
        assert_eq!(read_var[7..], READ_VAR_OK);

        // Write Var still on the same connection.
        sock.write_all(&telegram(&job_tpdu(0x00, 0x05))).await.unwrap();
        let mut write_var = [0u8; 15];
        sock.read_exact(&mut write_var).await.unwrap();
        assert_eq!(write_var[..4], [0x03, 0x00, 0x00, 0x0F]);
        assert_eq!(write_var[7..], WRITE_VAR_OK);
    }

    #[tokio::test]
    async fn test_szl_request_yields_the_canned_identification() {
        let addr = start_responder().await;
        let mut sock = TcpStream::connect(addr).await.unwrap();

        sock.write_all(&telegram(&job_tpdu(0x00, 0x01))).await.unwrap();

        let mut resp = [0u8; 31];
        sock.read_exact(&mut resp).await.unwrap();
        assert_eq!(resp[..7], [0x03, 0x00, 0x00, 0x1F, 0x02, 0xF0, 0x80]);
        assert_eq!(resp[7..], SZL_SYSTEM_ID);
    }

    #[tokio::test]
    async fn test_non_tpkt_traffic_is_closed_silently() {
        let addr = start_responder().await;
        let mut sock = TcpStream::connect(addr).await.unwrap();

        // Exactly one header's worth, so the close is a clean FIN.
        sock.write_all(b"GET ").await.unwrap();

        let mut buf = [0u8; 16];
        let n = timeout(Duration::from_secs(2), sock.read(&mut buf))
            .await
            .expect("responder should close, not stall")
            .unwrap();
        assert_eq!(n, 0, "no bytes may be sent before the close");
    }

    #[tokio::test]
    async fn test_unknown_job_gets_no_response_but_keeps_the_connection() {
        let addr = start_responder().await;
        let mut sock = TcpStream::connect(addr).await.unwrap();

        sock.write_all(&telegram(&job_tpdu(0x00, 0x07))).await.unwrap();
        let mut buf = [0u8; 16];
        let res = timeout(Duration::from_millis(300), sock.read(&mut buf)).await;
        assert!(res.is_err(), "unknown jobs are ignored silently");

        // The connection is still usable.
        sock.write_all(&telegram(&[0xE0, 0x00, 0x00, 0x00])).await.unwrap();
        let mut cc = [0u8; 9];
        sock.read_exact(&mut cc).await.unwrap();
        assert_eq!(cc[..4], [0x03, 0x00, 0x00, 0x09]);
    }
}
