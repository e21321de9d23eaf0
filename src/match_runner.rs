//! Runs exactly one match between two configured agents.
//!
//! The orchestrator drives the ply loop against the external game-state
//! collaborator: ready-check the acting agent, push the position, request a move
//! under that agent's node budget, optionally pull its supplemental training
//! payload, apply the move. When the game-state collaborator reports a terminal
//! position the result is read from the first-configured agent's perspective and
//! both agents are terminated.
//!
//! Termination is guaranteed on every exit path: handles live inside a guard that
//! terminates on drop, so an agent erroring mid-game (or a panic in the game
//! collaborator) still tears both processes down.

use anyhow::Context;
use tracing::{info, instrument, trace, warn};

use crate::agent_interface::{AgentFactory, AgentHandle, GameState};
use crate::config::AgentConfig;
use crate::error::MatchAbortedError;
use crate::training_record::normalize_hex_record;

/// Everything a completed match produces.
#[derive(Debug)]
pub struct MatchOutput {
    /// Terminal result from the first-configured agent's perspective: +1/0/-1.
    pub outcome: i8,
    /// Normalized training records collected from the first agent.
    pub first_records: Vec<Vec<u8>>,
    /// Normalized training records collected from the second agent, labeled with
    /// the negated outcome.
    pub second_records: Vec<Vec<u8>>,
}

/// Terminates the wrapped agent when dropped.
struct AgentGuard {
    handle: Box<dyn AgentHandle + Send>,
}

impl AgentGuard {
    fn launch(agents: &dyn AgentFactory, config: &AgentConfig) -> anyhow::Result<Self> {
        let handle = agents
            .launch(config)
            .with_context(|| format!("could not launch agent '{}'", config.id))?;
        Ok(Self { handle })
    }
}

impl Drop for AgentGuard {
    fn drop(&mut self) {
        self.handle.terminate();
    }
}

/// Run one match between `first` and `second` to completion.
///
/// Returns the terminal outcome plus both agents' normalized training records.
/// Corrupt records are dropped individually (with a warning) and do not fail the
/// match.
///
/// # Errors
/// [`MatchAbortedError`] (wrapped) when an agent becomes unresponsive mid-game;
/// launch and game-state failures propagate as-is. Both agents are terminated in
/// every case.
#[instrument(skip_all, fields(first = %first.id, second = %second.id))]
pub fn run_match<G: GameState>(
    agents: &dyn AgentFactory,
    mut game: G,
    first: &AgentConfig,
    second: &AgentConfig,
) -> anyhow::Result<MatchOutput> {
    let mut first_guard = AgentGuard::launch(agents, first)?;
    let mut second_guard = AgentGuard::launch(agents, second)?;

    let mut first_payloads = Vec::new();
    let mut second_payloads = Vec::new();

    while !game.is_terminal() {
        let side = game.side_to_move();
        trace!(side, "ply");
        let (guard, config, payloads) = if side == 0 {
            (&mut first_guard, first, &mut first_payloads)
        } else {
            (&mut second_guard, second, &mut second_payloads)
        };

        let mv = play_ply(guard, config, &game.position(), payloads)?;
        game.apply_move(&mv)
            .with_context(|| format!("agent '{}' returned an unplayable move: {mv}", config.id))?;
    }

    let outcome = game.result();
    info!("{} vs {}: {}", first.id, second.id, outcome);

    // Agents are shut down before their records are labeled.
    drop(second_guard);
    drop(first_guard);

    Ok(MatchOutput {
        outcome,
        first_records: label_payloads(&first_payloads, outcome, &first.id),
        second_records: label_payloads(&second_payloads, -outcome, &second.id),
    })
}

fn play_ply(
    guard: &mut AgentGuard,
    config: &AgentConfig,
    position: &str,
    payloads: &mut Vec<String>,
) -> Result<String, MatchAbortedError> {
    let aborted = |source| MatchAbortedError {
        agent: config.id.clone(),
        source,
    };

    let handle = guard.handle.as_mut();
    handle.set_ready().map_err(aborted)?;
    handle.push_position(position).map_err(aborted)?;
    let mv = handle.request_move(config.nodes).map_err(aborted)?;
    if config.collect_training_data {
        if let Some(payload) = handle.request_training_data().map_err(aborted)? {
            payloads.push(payload);
        }
    }
    Ok(mv)
}

/// Normalize every collected payload with the given outcome sign, dropping the
/// corrupt ones.
fn label_payloads(payloads: &[String], outcome: i8, agent_id: &str) -> Vec<Vec<u8>> {
    let mut records = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match normalize_hex_record(payload, outcome) {
            Ok(record) => records.push(record),
            Err(e) => warn!("dropping training record from '{agent_id}': {e}"),
        }
    }
    records
}
