//! Raw byte-echo listeners.
//!
//! Devices probe a handful of TCP ports before talking HTTP. Each echo
//! listener writes every received byte back until the peer closes.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Bind an echo listener on `ip:port`.
pub async fn bind_echo(ip: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((ip, port)).await
}

/// Accept and echo until shutdown is signalled.
pub async fn run_echo(listener: TcpListener, mut shutdown: broadcast::Receiver<()>) {
    let local = listener.local_addr().ok();
    tracing::info!(address = ?local, "Echo listener started");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(echo_connection(stream, peer));
                }
                Err(e) => tracing::debug!(error = %e, "Echo accept failed"),
            },
        }
    }

    tracing::info!(address = ?local, "Echo listener stopped");
}

async fn echo_connection(mut stream: TcpStream, peer: SocketAddr) {
    let (mut reader, mut writer) = stream.split();
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => tracing::trace!(peer = %peer, bytes, "Echo connection closed"),
        Err(e) => tracing::debug!(peer = %peer, error = %e, "Echo connection failed"),
    }
}
