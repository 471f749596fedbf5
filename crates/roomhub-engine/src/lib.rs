//! Authoritative Tetris simulation.
//!
//! Pure, deterministic per-player game state: no timers, no I/O. A driver
//! (the Match Runner, in `roomhub`) owns the clock and calls [`Simulation::tick`]
//! at a fixed rate, applying player [`Action`]s between ticks.
mod action;
mod board;
mod piece;
mod simulation;
mod state;

pub use action::Action;
pub use board::{Board, HEIGHT, WIDTH};
pub use piece::{Kind, Orientation};
pub use simulation::Simulation;
pub use state::{GhostView, LineStats, PieceView, Stats, State};
