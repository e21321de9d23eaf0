//! # Ai League
//!
//! A modular Rust crate for running an adaptive agent league: a reference
//! game-playing agent is continuously pitted against a roster of opponents of
//! varying strength, per-game training data is recorded, and each opponent's
//! strength is retuned so that win/loss statistics stay near a target band.
//!
//! It provides:
//! - Concurrent match workers driving agent processes through a capability
//!   interface ([`AgentHandle`](crate::agent_interface::AgentHandle))
//! - Weighted opponent selection under a live, versioned tuning table
//!   ([`TransientConfig`](crate::config::TransientConfig))
//! - A shared [`ControlServer`](crate::server::ControlServer) aggregating results
//!   into running statistics and rebalancing opponent node budgets
//! - Durable results, training-record streams and config versions via
//!   [`SqliteStore`](crate::persistence::SqliteStore)
//!
//! The agent transport (process handshake, command queuing, wire parsing) and
//! the game rules are external collaborators: you implement
//! [`AgentFactory`](crate::agent_interface::AgentFactory) and
//! [`GameStateFactory`](crate::agent_interface::GameStateFactory) for your
//! protocol and game, and the league takes care of the rest.
//!
//! # Usage Example
//!
//! Below is a minimal league over two agents, with a stubbed transport:
//!
//! ```no_run
//! # struct UciAgents;
//! # impl ai_league::agent_interface::AgentFactory for UciAgents {
//! #     fn launch(
//! #         &self,
//! #         _config: &ai_league::config::AgentConfig,
//! #     ) -> anyhow::Result<Box<dyn ai_league::agent_interface::AgentHandle + Send>> {
//! #         unimplemented!()
//! #     }
//! # }
//! # struct ChessGame;
//! # impl ai_league::agent_interface::GameState for ChessGame {
//! #     fn position(&self) -> String { String::new() }
//! #     fn side_to_move(&self) -> usize { 0 }
//! #     fn apply_move(&mut self, _mv: &str) -> anyhow::Result<()> { Ok(()) }
//! #     fn is_terminal(&self) -> bool { true }
//! #     fn result(&self) -> i8 { 0 }
//! # }
//! # struct ChessGames;
//! # impl ai_league::agent_interface::GameStateFactory<ChessGame> for ChessGames {
//! #     fn new_game(&self) -> ChessGame { ChessGame }
//! # }
//! use std::sync::Arc;
//!
//! use ai_league::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Static roster: how to launch each agent. "lc0" is the reference agent.
//!     let roster = Roster::new("lc0", "/data/nets")
//!         .with_agent(
//!             "lc0",
//!             AgentTemplate::new("/usr/local/bin/lc0")
//!                 .with_option("Threads", "1")
//!                 .with_training_data(),
//!         )
//!         .with_agent(
//!             "sf9",
//!             AgentTemplate::new("/usr/local/bin/stockfish").with_option("Threads", "2"),
//!         );
//!
//!     // Live tuning defaults, used until a persisted version exists.
//!     let mut default_config = TransientConfig::new();
//!     default_config.insert("sf9".to_string(), OpponentTuning::new(3200, 1));
//!     default_config.insert(
//!         "lc0".to_string(),
//!         OpponentTuning::new(800, 0).with_net("run1-550000.pb.gz"),
//!     );
//!
//!     let store = SqliteStore::open("run_1.db", "training_data", "run_1")?;
//!     let mut league = League::new(
//!         roster,
//!         Arc::new(UciAgents), // your transport, implementing AgentFactory
//!         ChessGames,          // your game collaborator, implementing GameStateFactory
//!         Box::new(store),
//!         default_config,
//!         LeagueConfig::from_env().with_workers(4),
//!     )?;
//!
//!     league.start();
//!     league.join();
//!     Ok(())
//! }
//! ```
//!
//! # Control loop
//!
//! Every reported result folds into that opponent's exponential moving average.
//! When the average leaves the `±0.2` band the opponent's node budget is scaled
//! and the new tuning table is persisted with a bumped version; workers pick the
//! change up on their next iteration (snapshots are pull-based and may be stale
//! for at most one match, by design).
#![warn(missing_docs)]

pub use anyhow;

pub mod agent_interface;
pub mod config;
pub mod error;
mod logger;
pub mod match_runner;
pub mod matchmaking;
pub mod persistence;
pub mod server;
pub mod training_record;
mod worker;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use ai_league::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent_interface::{AgentFactory, AgentHandle, GameState, GameStateFactory};
    pub use crate::config::{
        AgentConfig, AgentTemplate, LeagueConfig, OpponentTuning, Roster, TransientConfig,
    };
    pub use crate::persistence::{ResultStore, SqliteStore};
    pub use crate::server::{ControlServer, League, MatchReport};
}
