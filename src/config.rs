//! Configuration types: the static roster, the live per-opponent tuning, and the
//! runtime behavior of the league itself.
//!
//! Three layers with different lifetimes:
//!
//! - [`Roster`] is static for a run: which agents exist, how to launch them, and
//!   which one is the reference agent being trained.
//! - [`TransientConfig`] is live, shared and versioned: per-opponent node budget,
//!   selection weight, optional network reference and option overrides. It is owned
//!   by the [`ControlServer`](crate::server::ControlServer) and mutated only through
//!   its rebalance step; workers read point-in-time snapshots.
//! - [`LeagueConfig`] controls the league runtime (worker count, rebalance cadence,
//!   logging) and can be loaded from the environment.
//!
//! # Environment Variables
//!
//! All values are optional and override [`LeagueConfig`] defaults:
//!
//! - `LEAGUE_WORKERS` — number of concurrent match workers (default: number of CPUs)
//! - `LEAGUE_REBALANCE_EVERY` — results between rebalance attempts (default: `1`)
//! - `LEAGUE_SEED_WINDOW` — persisted results replayed to seed statistics (default: `100`)
//! - `LEAGUE_LOG` — set to `"true"` to enable logging to a file (default: `false`)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Option rewritten to an absolute path when a tuning entry carries a `net` reference.
pub const WEIGHTS_OPTION: &str = "WeightsFile";

/// Ready-to-run configuration for one agent in one match.
///
/// Built fresh per match from an [`AgentTemplate`] merged with the live
/// [`OpponentTuning`]; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Roster id of the agent.
    pub id: String,
    /// Launch command for the agent process.
    pub command: String,
    /// Search budget (in nodes) for each move request.
    pub nodes: i64,
    /// Option overrides sent to the agent after launch.
    pub options: BTreeMap<String, String>,
    /// Whether to ask this agent for supplemental training data after each move.
    pub collect_training_data: bool,
}

/// Static launch template for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTemplate {
    /// Launch command for the agent process.
    pub command: String,
    /// Baseline options; live overrides win on conflict.
    pub options: BTreeMap<String, String>,
    /// Whether this agent emits supplemental training data.
    pub collect_training_data: bool,
}

impl AgentTemplate {
    /// A template with no options and no training-data collection.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            options: BTreeMap::new(),
            collect_training_data: false,
        }
    }

    /// Set a baseline option.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Enable supplemental training-data collection for this agent.
    pub fn with_training_data(mut self) -> Self {
        self.collect_training_data = true;
        self
    }
}

/// The static agent table for a run.
#[derive(Debug, Clone)]
pub struct Roster {
    /// Id of the reference agent (the one being trained). Must exist in `agents`.
    pub reference: String,
    /// All known agents, keyed by id. Only ids present here are eligible opponents.
    pub agents: BTreeMap<String, AgentTemplate>,
    /// Base directory holding network weights files referenced by tuning entries.
    pub net_dir: PathBuf,
}

impl Roster {
    /// Create a roster around a reference agent id.
    pub fn new(reference: impl Into<String>, net_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference: reference.into(),
            agents: BTreeMap::new(),
            net_dir: net_dir.into(),
        }
    }

    /// Register an agent template.
    pub fn with_agent(mut self, id: impl Into<String>, template: AgentTemplate) -> Self {
        self.agents.insert(id.into(), template);
        self
    }
}

/// Live tuning for one opponent: the adjustable knobs of the control loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpponentTuning {
    /// Search budget handed to the opponent per move.
    ///
    /// Signed: the rebalance step can multiply a budget by `-1.1` and drive it
    /// negative (see `DESIGN.md`).
    pub nodes: i64,
    /// Selection weight; `0` keeps the entry configured but never drawn.
    pub weight: u32,
    /// Network weights file, relative to the roster's `net_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<String>,
    /// Option overrides applied on top of the static template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl OpponentTuning {
    /// Tuning with the given budget and weight, no net and no overrides.
    pub fn new(nodes: i64, weight: u32) -> Self {
        Self {
            nodes,
            weight,
            net: None,
            options: BTreeMap::new(),
        }
    }

    /// Reference a network weights file (relative to the roster's `net_dir`).
    pub fn with_net(mut self, net: impl Into<String>) -> Self {
        self.net = Some(net.into());
        self
    }

    /// Set an option override.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }
}

/// The live, versioned per-opponent tuning table.
pub type TransientConfig = BTreeMap<String, OpponentTuning>;

/// Runtime behavior of the league.
#[derive(Debug, Clone, Copy)]
pub struct LeagueConfig {
    pub(crate) workers: usize,
    pub(crate) rebalance_every: usize,
    pub(crate) seed_window: usize,
    pub(crate) retry_backoff: Duration,
    pub(crate) log: bool,
}

impl LeagueConfig {
    /// Create a configuration with default parameters.
    ///
    /// By default:
    /// - One worker per CPU.
    /// - Every reported result triggers a rebalance attempt.
    /// - The last 100 persisted results seed the running statistics.
    /// - Failed worker iterations back off for one second.
    /// - Logging to file is disabled.
    pub fn new() -> Self {
        Self {
            workers: num_cpus::get(),
            rebalance_every: 1,
            seed_window: 100,
            retry_backoff: Duration::from_secs(1),
            log: false,
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults of [`LeagueConfig::new`].
    pub fn from_env() -> Self {
        fn get_env_usize(var: &str, default: usize) -> usize {
            match std::env::var(var) {
                Ok(val) => val.parse().unwrap_or(default),
                Err(_) => default,
            }
        }
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let defaults = Self::new();
        Self {
            workers: get_env_usize("LEAGUE_WORKERS", defaults.workers),
            rebalance_every: get_env_usize("LEAGUE_REBALANCE_EVERY", defaults.rebalance_every),
            seed_window: get_env_usize("LEAGUE_SEED_WINDOW", defaults.seed_window),
            retry_backoff: defaults.retry_backoff,
            log: get_env_flag("LEAGUE_LOG", defaults.log),
        }
    }

    /// Set the number of concurrent match workers.
    pub fn with_workers(mut self, value: usize) -> Self {
        self.workers = value;
        self
    }

    /// Set how many reported results accumulate between rebalance attempts.
    pub fn with_rebalance_every(mut self, value: usize) -> Self {
        self.rebalance_every = value.max(1);
        self
    }

    /// Set how many persisted results are replayed to seed the running statistics.
    pub fn with_seed_window(mut self, value: usize) -> Self {
        self.seed_window = value;
        self
    }

    /// Set the pause after a failed worker iteration.
    pub fn with_retry_backoff(mut self, value: Duration) -> Self {
        self.retry_backoff = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self::new()
    }
}
