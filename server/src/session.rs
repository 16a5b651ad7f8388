//! Per-session command loop: the state machine that owns a client from
//! admission to teardown.
//!
//! The loop runs inside a dispatcher task and `select!`s over the client's
//! request channel, terminal events from the tick engine, and the shutdown
//! signal. Level transitions and teardown always join the tick task before
//! the board is swapped or released, and the tick task is respawned only
//! after the new board is installed and the session reactivated — with no
//! lock held across either step.

use crate::board::{Direction, MoveOutcome};
use crate::context::ServerContext;
use crate::levels::LevelCatalog;
use crate::slots::{SessionSlot, SessionState};
use crate::tick;
use log::{debug, error, info, warn};
use shared::{BoardSnapshot, OP_DISCONNECT, OP_PLAY};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Write half of the session's notify channel, shared between the command
/// loop and the tick engine so snapshots and acks never interleave
/// mid-frame.
pub type NotifyChannel = Arc<Mutex<UnixStream>>;

/// Terminal outcomes the tick engine reports back to the command loop. The
/// tick task stops itself after sending one; only the command loop acts on
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickEvent {
    ReachedGoal,
    Died,
}

enum PlayResult {
    Continue,
    GameOver,
    LevelDone,
}

/// Runs one session to completion. The slot must already be claimed and its
/// board loaded; the slot is released before returning.
pub async fn run(
    ctx: Arc<ServerContext>,
    slot: Arc<SessionSlot>,
    mut request: UnixStream,
    notify: NotifyChannel,
) {
    let session_id = slot.session_id().await;
    debug!("session {session_id}: starting in slot {}", slot.index);

    // Starting: initial snapshot, then the tick engine
    send_board_update(&slot, &notify).await;
    let (tick_tx, mut tick_rx) = mpsc::channel(4);
    let mut tick = Some(tick::spawn(
        ctx.clone(),
        slot.clone(),
        notify.clone(),
        tick_tx.clone(),
    ));

    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                debug!("session {session_id}: shutdown requested");
                break;
            }
            event = tick_rx.recv() => {
                // the loop keeps its own sender, so recv only yields events
                let Some(event) = event else { break };
                match event {
                    // the tick engine already sent the final snapshot
                    TickEvent::Died => break,
                    TickEvent::ReachedGoal => {
                        join_tick(&mut tick).await;
                        if !advance_level(&ctx, &slot, &notify, &tick_tx, &mut tick, session_id)
                            .await
                        {
                            break;
                        }
                    }
                }
            }
            opcode = request.read_u8() => {
                let opcode = match opcode {
                    Ok(opcode) => opcode,
                    Err(e) => {
                        debug!("session {session_id}: request channel closed: {e}");
                        break;
                    }
                };
                match opcode {
                    OP_DISCONNECT => {
                        info!("session {session_id}: client disconnected");
                        slot.deactivate().await;
                        send_frame(&notify, &shared::encode_ack(OP_DISCONNECT, 0)).await;
                        break;
                    }
                    OP_PLAY => {
                        let command = match request.read_u8().await {
                            Ok(command) => command,
                            Err(e) => {
                                debug!("session {session_id}: request channel closed: {e}");
                                break;
                            }
                        };
                        match apply_play(&slot, &notify, command).await {
                            PlayResult::Continue => {}
                            PlayResult::GameOver => {
                                info!("session {session_id}: game over");
                                break;
                            }
                            PlayResult::LevelDone => {
                                join_tick(&mut tick).await;
                                if !advance_level(
                                    &ctx, &slot, &notify, &tick_tx, &mut tick, session_id,
                                )
                                .await
                                {
                                    break;
                                }
                            }
                        }
                    }
                    other => warn!("session {session_id}: unknown opcode {other}"),
                }
            }
        }
    }

    // Ending: stop the tick engine, then release everything exactly once
    slot.deactivate().await;
    join_tick(&mut tick).await;
    *slot.board.write().await = None;
    ctx.slots.release(&slot).await;
    info!("session {session_id}: ended");
}

/// Applies one manual move under the session and board locks and classifies
/// the result. Scripted players ignore manual input; the tick engine drives
/// them.
async fn apply_play(slot: &SessionSlot, notify: &NotifyChannel, command: u8) -> PlayResult {
    let Some(dir) = Direction::from_command(command) else {
        return PlayResult::Continue;
    };
    let mut state = slot.state.lock().await;
    let outcome = {
        let mut board = slot.board.write().await;
        let Some(board) = board.as_mut() else {
            return PlayResult::Continue;
        };
        if board.players.is_empty() || board.player_scripted() || !board.player_alive() {
            return PlayResult::Continue;
        }
        board.move_player(0, dir)
    };
    match outcome {
        MoveOutcome::Normal => {
            send_board_update_locked(slot, &state, notify).await;
            PlayResult::Continue
        }
        MoveOutcome::Died => {
            // exactly one final snapshot, sent before the flag flips
            send_board_update_locked(slot, &state, notify).await;
            state.game_active = false;
            drop(state);
            slot.tick_wake.notify_one();
            PlayResult::GameOver
        }
        MoveOutcome::ReachedGoal => {
            state.game_active = false;
            drop(state);
            slot.tick_wake.notify_one();
            PlayResult::LevelDone
        }
    }
}

/// Level transition: load the next level with the score carried over, or
/// finish with victory when the catalog runs out. The tick engine must
/// already be joined. Returns false when the session is done.
async fn advance_level(
    ctx: &Arc<ServerContext>,
    slot: &Arc<SessionSlot>,
    notify: &NotifyChannel,
    tick_tx: &mpsc::Sender<TickEvent>,
    tick: &mut Option<JoinHandle<()>>,
    session_id: u32,
) -> bool {
    let carry = slot.board.read().await.as_ref().map_or(0, |b| b.score());
    let next = {
        let mut state = slot.state.lock().await;
        state.current_level += 1;
        state.current_level
    };
    let catalog = LevelCatalog::new(&ctx.config.levels_dir);
    match catalog.load(next, carry) {
        Ok(Some(board)) => {
            info!("session {session_id}: advancing to level {next}");
            *slot.board.write().await = Some(board);
            {
                let mut state = slot.state.lock().await;
                state.game_active = true;
                send_board_update_locked(slot, &state, notify).await;
            }
            *tick = Some(tick::spawn(
                ctx.clone(),
                slot.clone(),
                notify.clone(),
                tick_tx.clone(),
            ));
            true
        }
        Ok(None) => {
            info!("session {session_id}: completed the final level");
            let mut state = slot.state.lock().await;
            state.victory = true;
            send_board_update_locked(slot, &state, notify).await;
            false
        }
        Err(e) => {
            warn!("session {session_id}: failed to load level {next}: {e}");
            false
        }
    }
}

/// Waits for the tick engine to fully stop. Mandatory before the board is
/// swapped or released.
async fn join_tick(tick: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = tick.take() {
        if let Err(e) = handle.await {
            error!("tick task panicked: {e}");
        }
    }
}

/// Snapshot broadcast used by both session actors. Takes the session lock so
/// a snapshot never interleaves with the other actor's decide-and-send step.
pub(crate) async fn send_board_update(slot: &SessionSlot, notify: &NotifyChannel) {
    let state = slot.state.lock().await;
    send_board_update_locked(slot, &state, notify).await;
}

pub(crate) async fn send_board_update_locked(
    slot: &SessionSlot,
    state: &SessionState,
    notify: &NotifyChannel,
) {
    let frame = {
        let board = slot.board.read().await;
        let Some(board) = board.as_ref() else { return };
        let snapshot = BoardSnapshot {
            width: board.width as i32,
            height: board.height as i32,
            tempo: board.tempo_ms as i32,
            victory: state.victory,
            game_over: board.is_game_over(),
            score: board.score(),
            cells: board.render(),
        };
        match snapshot.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("session {}: cannot serialize snapshot: {e}", state.session_id);
                return;
            }
        }
    };
    send_frame(notify, &frame).await;
}

/// Writes one frame to the notify channel. Failures mean the peer is gone;
/// they are logged and swallowed, and the next request read ends the
/// session.
async fn send_frame(notify: &NotifyChannel, frame: &[u8]) {
    let mut channel = notify.lock().await;
    if let Err(e) = channel.write_all(frame).await {
        debug!("notify write failed: {e}");
    }
}
