//! Per-session tick engine: advances scripted entities and broadcasts a
//! snapshot at the board's tempo.
//!
//! The engine terminates cooperatively: it re-checks `game_active` after
//! every sleep and never touches the board once the flag is down, which is
//! why the command loop can join it before swapping or releasing the board.

use crate::board::MoveOutcome;
use crate::context::ServerContext;
use crate::session::{send_board_update_locked, NotifyChannel, TickEvent};
use crate::slots::SessionSlot;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) fn spawn(
    ctx: Arc<ServerContext>,
    slot: Arc<SessionSlot>,
    notify: NotifyChannel,
    events: mpsc::Sender<TickEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run(ctx, slot, notify, events))
}

async fn run(
    ctx: Arc<ServerContext>,
    slot: Arc<SessionSlot>,
    notify: NotifyChannel,
    events: mpsc::Sender<TickEvent>,
) {
    debug!("slot {}: tick engine started", slot.index);
    loop {
        // tempo is re-read every cycle; a level transition can change it
        let tempo_ms = {
            let board = slot.board.read().await;
            match board.as_ref() {
                Some(board) => board.tempo_ms,
                None => break,
            }
        };
        // an early wake via tick_wake only means "re-check the flag"; the
        // permit a Notify stores can outlive the deactivation it signalled
        let due = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(tempo_ms)) => true,
            _ = slot.tick_wake.notified() => false,
            _ = ctx.shutdown.cancelled() => break,
        };

        // the command loop may have ended the session during the sleep;
        // holding the session lock here serializes this whole cycle against
        // its decide-and-send step
        let state = slot.state.lock().await;
        if !state.game_active {
            break;
        }
        if !due {
            continue;
        }

        let mut terminal = None;
        {
            let mut board = slot.board.write().await;
            let Some(board) = board.as_mut() else { break };
            if board.player_scripted() && board.player_alive() {
                match board.advance_player(0) {
                    Some(MoveOutcome::ReachedGoal) => terminal = Some(TickEvent::ReachedGoal),
                    Some(MoveOutcome::Died) => terminal = Some(TickEvent::Died),
                    _ => {}
                }
            }
            if terminal.is_none() {
                let alive_before = board.player_alive();
                for index in 0..board.ghosts.len() {
                    board.advance_ghost(index);
                }
                if alive_before && !board.player_alive() {
                    terminal = Some(TickEvent::Died);
                }
            }
        }

        match terminal {
            None => send_board_update_locked(&slot, &state, &notify).await,
            Some(TickEvent::Died) => {
                // final snapshot shows the death; the command loop tears down
                send_board_update_locked(&slot, &state, &notify).await;
                drop(state);
                let _ = events.send(TickEvent::Died).await;
                break;
            }
            Some(TickEvent::ReachedGoal) => {
                // board is mid-transition: no snapshot until the command
                // loop has loaded the next level
                drop(state);
                let _ = events.send(TickEvent::ReachedGoal).await;
                break;
            }
        }
    }
    debug!("slot {}: tick engine stopped", slot.index);
}
