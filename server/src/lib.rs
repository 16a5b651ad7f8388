//! # Maze-chase game server library
//!
//! Session-oriented multiplayer server: every client drives an independent
//! game board (movement, level progression, scoring) while the server
//! multiplexes admission, session lifecycle, and periodic world ticks across
//! a fixed pool of worker tasks.
//!
//! ## Architecture
//!
//! A single listener actor accepts rendezvous connections and feeds parsed
//! connect requests into a bounded admission queue. A pool of dispatcher
//! actors (one per session slot) pulls from the queue, claims a slot, dials
//! the client's two channels, and runs the session command loop to
//! completion. Each active session additionally spawns one tick engine task
//! that advances scripted entities and broadcasts snapshots at the board's
//! tempo.
//!
//! Per session, the command loop and the tick engine share one board under a
//! reader/writer lock (mutations take write, snapshot serialization takes
//! read) and one session lock that serializes their decide-what-happens-next
//! steps. Between sessions there is no shared state beyond the admission
//! queue and the slot pool, each independently synchronized.
//!
//! ## Shutdown
//!
//! A process-wide watch flag is the single cancellation signal. Every
//! blocking wait — queue insert/remove, channel reads, tick sleeps —
//! `select!`s on it, so triggering shutdown wakes every parked actor exactly
//! once. In-flight sessions drain through their own state machines before
//! their slots are released.
//!
//! ## Module organization
//!
//! - [`admission`]: bounded MPMC queue between listener and dispatchers
//! - [`slots`]: fixed session-slot pool and per-slot synchronization
//! - [`board`] / [`levels`]: the game engine and the level catalog
//! - [`dispatcher`]: admission handshake and session execution
//! - [`session`]: the per-session command-loop state machine
//! - [`listener`]: rendezvous accept loop and leaderboard dumps
//! - [`leaderboard`]: top-scores report artifact
//! - [`context`]: shared server context and the shutdown signal

pub mod admission;
pub mod board;
pub mod context;
pub mod dispatcher;
pub mod leaderboard;
pub mod levels;
pub mod listener;
pub mod session;
pub mod slots;
pub(crate) mod tick;
