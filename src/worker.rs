//! The per-thread control loop: select, play, report, refresh.
//!
//! A worker runs unbounded until its shared stop flag is raised. Each iteration
//! pulls a fresh tuning snapshot from the control server, draws an opponent,
//! builds both agent configurations, randomly assigns sides to avoid a
//! systematic first-move bias, runs the match and reports the outcome translated
//! back into the reference agent's frame.
//!
//! Failure policy per iteration: an aborted match is logged and yields no report;
//! anything else (selection errors, launch failures, persistence errors) is
//! logged and retried after a backoff pause. The stop flag is only checked at
//! iteration boundaries, never mid-match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, instrument, trace, warn};

use crate::agent_interface::{AgentFactory, GameState, GameStateFactory};
use crate::config::{Roster, WEIGHTS_OPTION};
use crate::error::MatchAbortedError;
use crate::match_runner::run_match;
use crate::matchmaking::{build_agent_config, choose_opponent};
use crate::server::{ControlServer, MatchReport};

pub(crate) struct Worker<G, F>
where
    G: GameState,
    F: GameStateFactory<G>,
{
    server: Arc<ControlServer>,
    roster: Arc<Roster>,
    agents: Arc<dyn AgentFactory + Send + Sync>,
    games: Arc<F>,
    stop: Arc<AtomicBool>,
    retry_backoff: Duration,
    _game: std::marker::PhantomData<G>,
}

impl<G, F> Worker<G, F>
where
    G: GameState + Send + 'static,
    F: GameStateFactory<G> + Send + Sync + 'static,
{
    pub(crate) fn new(
        server: Arc<ControlServer>,
        roster: Arc<Roster>,
        agents: Arc<dyn AgentFactory + Send + Sync>,
        games: Arc<F>,
        stop: Arc<AtomicBool>,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            server,
            roster,
            agents,
            games,
            stop,
            retry_backoff,
            _game: std::marker::PhantomData,
        }
    }

    /// The worker's entire lifetime: loop until the stop flag is raised.
    #[instrument(skip_all)]
    pub(crate) fn run(&self) {
        let mut matches_reported = 0usize;
        while !self.stop.load(Ordering::Relaxed) {
            match self.run_once() {
                Ok(true) => {
                    matches_reported += 1;
                    trace!(matches_reported, "result reported");
                }
                Ok(false) => {} // aborted match: nothing to report
                Err(e) => {
                    warn!("worker iteration failed: {e:#}");
                    std::thread::sleep(self.retry_backoff);
                }
            }
        }
        info!(matches_reported, "worker stopped");
    }

    /// One full iteration. `Ok(true)` when a result was reported.
    fn run_once(&self) -> anyhow::Result<bool> {
        let transient = self.server.get_config();
        let mut rng = rand::thread_rng();

        let opponent_id = choose_opponent(&self.roster, &transient, &mut rng)?;
        let reference = build_agent_config(&self.roster.reference, &self.roster, &transient)?;
        let opponent = build_agent_config(&opponent_id, &self.roster, &transient)?;

        // +1: reference moves first, -1: opponent does
        let side_sign: i8 = if rng.gen::<bool>() { 1 } else { -1 };
        let (first, second) = if side_sign == 1 {
            (&reference, &opponent)
        } else {
            (&opponent, &reference)
        };

        let game = self.games.new_game();
        let output = match run_match(self.agents.as_ref(), game, first, second) {
            Ok(output) => output,
            Err(e) if e.is::<MatchAbortedError>() => {
                warn!("{e:#}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        // records stay in board order; the result moves into the reference frame
        let mut records = output.first_records;
        records.extend(output.second_records);

        self.server.report_results(vec![MatchReport {
            opponent_id,
            net_id: net_id(&reference),
            opponent_nodes: opponent.nodes,
            outcome: output.outcome * side_sign,
            records,
        }])?;
        Ok(true)
    }
}

/// The reference agent's network id: the file name of its weights option.
fn net_id(reference: &crate::config::AgentConfig) -> String {
    reference
        .options
        .get(WEIGHTS_OPTION)
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or("unset")
        .to_string()
}

#[cfg(test)]
mod worker_tests {
    use super::*;
    use crate::config::AgentConfig;

    fn reference_with_weights(path: &str) -> AgentConfig {
        AgentConfig {
            id: "lc0".to_string(),
            command: "/bin/lc0".to_string(),
            nodes: 800,
            options: [(WEIGHTS_OPTION.to_string(), path.to_string())]
                .into_iter()
                .collect(),
            collect_training_data: true,
        }
    }

    #[test]
    fn net_id_is_the_weights_file_name() {
        let config = reference_with_weights("/data/nets/run1-550000.pb.gz");
        assert_eq!(net_id(&config), "run1-550000.pb.gz");
    }

    #[test]
    fn net_id_defaults_when_no_weights_configured() {
        let mut config = reference_with_weights("x");
        config.options.clear();
        assert_eq!(net_id(&config), "unset");
    }
}
