//! Session dispatchers: the worker pool that turns queued connect requests
//! into running sessions.
//!
//! Each dispatcher pulls from the admission queue, claims a slot, performs
//! the admission handshake, and then runs the session command loop to
//! completion on its own task. Sessions therefore occupy a worker from a
//! bounded pool instead of spawning a thread per connect.

use crate::context::ServerContext;
use crate::levels::{LevelCatalog, LevelError};
use crate::session::{self, NotifyChannel};
use crate::slots::{ClaimOutcome, SessionSlot};
use log::{debug, info, warn};
use shared::{ConnectRequest, OP_CONNECT};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;

/// Pause after requeueing a request that found no free slot, so a full pool
/// does not spin on the same request.
const RETRY_PAUSE: Duration = Duration::from_millis(50);

pub async fn run(ctx: Arc<ServerContext>, id: usize) {
    debug!("dispatcher {id}: started");
    while !ctx.shutdown.is_shutdown() {
        let Some(request) = ctx.admission.remove().await else {
            break;
        };
        let session_id = derive_session_id(&request.request_channel);
        match ctx.slots.claim(session_id).await {
            ClaimOutcome::Duplicate => {
                warn!(
                    "dispatcher {id}: session {session_id} already active, rejecting {}",
                    request.request_channel
                );
            }
            ClaimOutcome::Full => {
                debug!("dispatcher {id}: all slots busy, requeueing session {session_id}");
                ctx.admission.insert(request).await;
                tokio::time::sleep(RETRY_PAUSE).await;
            }
            ClaimOutcome::Claimed(slot) => {
                info!(
                    "dispatcher {id}: admitted session {session_id} into slot {}",
                    slot.index
                );
                match admit(&ctx, &request, &slot).await {
                    Ok((request_channel, notify_channel)) => {
                        session::run(ctx.clone(), slot, request_channel, notify_channel).await;
                    }
                    Err(e) => {
                        warn!("dispatcher {id}: session {session_id} setup failed: {e}");
                        ctx.slots.release(&slot).await;
                    }
                }
            }
        }
    }
    debug!("dispatcher {id}: stopped");
}

#[derive(Debug, Error)]
enum AdmitError {
    #[error("channel open failed: {0}")]
    Channel(#[from] std::io::Error),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error("levels directory has no levels")]
    NoLevels,
}

/// Opens the client's two channels, acknowledges the connect, and loads the
/// first level into the slot's board.
async fn admit(
    ctx: &ServerContext,
    request: &ConnectRequest,
    slot: &SessionSlot,
) -> Result<(UnixStream, NotifyChannel), AdmitError> {
    let request_channel = UnixStream::connect(&request.request_channel).await?;
    let mut notify_channel = UnixStream::connect(&request.notify_channel).await?;
    notify_channel
        .write_all(&shared::encode_ack(OP_CONNECT, 0))
        .await?;

    let catalog = LevelCatalog::new(&ctx.config.levels_dir);
    let board = catalog.load(0, 0)?.ok_or(AdmitError::NoLevels)?;
    *slot.board.write().await = Some(board);

    Ok((request_channel, Arc::new(Mutex::new(notify_channel))))
}

/// Session identity from the client-chosen request channel name: the
/// trailing decimal digits when present, otherwise a stable hash of the
/// whole name.
pub fn derive_session_id(channel_name: &str) -> u32 {
    let bytes = channel_name.as_bytes();
    let digits = bytes
        .iter()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits > 0 {
        if let Ok(id) = channel_name[bytes.len() - digits..].parse::<u32>() {
            return id;
        }
    }
    let mut hasher = DefaultHasher::new();
    channel_name.hash(&mut hasher);
    hasher.finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_digits_become_the_id() {
        assert_eq!(derive_session_id("/tmp/maze_req_42"), 42);
        assert_eq!(derive_session_id("req7"), 7);
        assert_eq!(derive_session_id("0"), 0);
    }

    #[test]
    fn test_names_without_digits_hash_stably() {
        let a = derive_session_id("/tmp/maze_req");
        let b = derive_session_id("/tmp/maze_req");
        assert_eq!(a, b);
        assert_ne!(a, derive_session_id("/tmp/other_req"));
    }

    #[test]
    fn test_overlong_digit_runs_fall_back_to_hash() {
        // 99999999999 overflows u32, so the name hashes instead
        let id = derive_session_id("req_99999999999");
        assert_eq!(id, derive_session_id("req_99999999999"));
    }
}
