//! Host actor: accepts rendezvous connections and feeds the admission
//! queue. Also owns the leaderboard-dump side responsibility: a SIGUSR1
//! delivered to the process makes it write the current top scores.

use crate::context::ServerContext;
use crate::leaderboard;
use log::{debug, info, warn};
use shared::{ConnectRequest, CONNECT_FRAME_LEN};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, Signal, SignalKind};

pub async fn run(ctx: Arc<ServerContext>, listener: UnixListener) {
    info!(
        "listener: accepting connections on {}",
        ctx.config.registry_path.display()
    );
    let mut dump_signal = match signal(SignalKind::user_defined1()) {
        Ok(signal) => Some(signal),
        Err(e) => {
            warn!("listener: cannot install SIGUSR1 handler: {e}");
            None
        }
    };

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            _ = recv_dump(&mut dump_signal) => {
                leaderboard::write_report(&ctx).await;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => handle_connect(&ctx, stream).await,
                    Err(e) => {
                        warn!("listener: accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
    info!("listener: stopped");
}

async fn recv_dump(dump_signal: &mut Option<Signal>) {
    match dump_signal {
        Some(signal) => {
            signal.recv().await;
        }
        None => std::future::pending().await,
    }
}

/// Reads one CONNECT frame from an accepted rendezvous connection.
/// Malformed or short frames are logged and dropped; the writer side closes
/// the connection after the frame, modeling writers that come and go.
async fn handle_connect(ctx: &ServerContext, mut stream: UnixStream) {
    let mut frame = [0u8; CONNECT_FRAME_LEN];
    if let Err(e) = stream.read_exact(&mut frame).await {
        debug!("listener: short connect frame: {e}");
        return;
    }
    match ConnectRequest::decode(&frame) {
        Ok(request) => {
            debug!(
                "listener: connect request req={} notify={}",
                request.request_channel, request.notify_channel
            );
            ctx.admission.insert(request).await;
        }
        Err(e) => warn!("listener: malformed connect frame: {e}"),
    }
}
