//! # Snake Daemon Library
//!
//! A single-process TCP server that multiplexes a fixed number of client
//! slots and a fixed-rate tick on one loop, and a multiplayer terminal snake
//! game that runs on top of it.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! The [`daemon::Daemon`] waits on the listening socket, every occupied
//! client socket and the next tick deadline at once. New connections are
//! handled before client data, and a tick only fires when nothing else is
//! pending. All hooks run to completion on the loop, so no game state is
//! ever shared between threads.
//!
//! ### Pluggable Handlers
//! Behaviour lives behind the [`daemon::Handler`] trait. The server starts
//! with a [`lobby::Lobby`] which swaps itself for the [`game::SnakeGame`]
//! when the first client arrives.
//!
//! ### Differential Frames
//! The game keeps the grid as it was at the last broadcast and sends only
//! the cells that changed since, as ANSI escape sequences. New clients get a
//! single full repaint instead.
//!
//! ## Module Organization
//!
//! - `daemon`: listener, wait loop, tick clock and hook dispatch
//! - `slots`: fixed slot table and per-client reads, writes and disconnects
//! - `lobby`: waiting room that builds the game on first connect
//! - `game`: snake rules, players, food and input handling
//! - `grid`: cell planes and wrap-around geometry
//! - `render`: full and differential ANSI frames
//! - `error`: error types shared by the modules above
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use server::daemon::{Daemon, DaemonConfig, Handler};
//! use server::game::{GameConfig, SnakeGame};
//! use server::lobby::Lobby;
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut daemon = Daemon::create(DaemonConfig::new(Ipv4Addr::UNSPECIFIED, 4242, 2, 10))?;
//!
//!     let game = SnakeGame::new(GameConfig::default(), 2, StdRng::from_entropy())?;
//!     let lobby = Lobby::new(Box::new(move || Box::new(game) as Box<dyn Handler>));
//!
//!     daemon.run(Box::new(lobby)).await?;
//!     Ok(())
//! }
//! ```

pub mod daemon;
pub mod error;
pub mod game;
pub mod grid;
pub mod lobby;
pub mod render;
pub mod slots;
