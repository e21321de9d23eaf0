//! Opponent selection and per-match agent configuration.
//!
//! Matchmaking merges two tables: the static [`Roster`] (how to launch each agent)
//! and the live [`TransientConfig`] snapshot (how strong each opponent currently
//! is, and how often it should be drawn). Both operations work on a point-in-time
//! snapshot; staleness of up to one worker iteration is accepted.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::{AgentConfig, Roster, TransientConfig, WEIGHTS_OPTION};
use crate::error::UnknownOpponentError;

/// Build the ready-to-run [`AgentConfig`] for `id`.
///
/// Starts from a copy of the static template, takes the node budget from the live
/// entry, merges the option maps (live overrides win) and, when the entry carries
/// a network reference, rewrites the weights option to an absolute path under the
/// roster's `net_dir`.
///
/// # Errors
/// [`UnknownOpponentError`] when `id` is missing from either table.
pub fn build_agent_config(
    id: &str,
    roster: &Roster,
    transient: &TransientConfig,
) -> Result<AgentConfig, UnknownOpponentError> {
    let template = roster
        .agents
        .get(id)
        .ok_or_else(|| UnknownOpponentError::MissingTemplate(id.to_string()))?;
    let tuning = transient
        .get(id)
        .ok_or_else(|| UnknownOpponentError::MissingTuning(id.to_string()))?;

    let mut options = template.options.clone();
    for (name, value) in &tuning.options {
        options.insert(name.clone(), value.clone());
    }
    if let Some(net) = &tuning.net {
        options.insert(
            WEIGHTS_OPTION.to_string(),
            roster.net_dir.join(net).display().to_string(),
        );
    }

    Ok(AgentConfig {
        id: id.to_string(),
        command: template.command.clone(),
        nodes: tuning.nodes,
        options,
        collect_training_data: template.collect_training_data,
    })
}

/// Draw the next opponent id, weighted by the live selection weights.
///
/// The draw is uniform over a multiset where each id present in both tables
/// appears `weight` times; weight-0 entries stay configured but are never drawn.
///
/// # Errors
/// [`UnknownOpponentError::NoneEligible`] when the multiset is empty.
pub fn choose_opponent<R: Rng>(
    roster: &Roster,
    transient: &TransientConfig,
    rng: &mut R,
) -> Result<String, UnknownOpponentError> {
    let mut pool = Vec::new();
    for (id, tuning) in transient {
        if roster.agents.contains_key(id) {
            for _ in 0..tuning.weight {
                pool.push(id.as_str());
            }
        }
    }
    pool.choose(rng)
        .map(|id| id.to_string())
        .ok_or(UnknownOpponentError::NoneEligible)
}

#[cfg(test)]
mod matchmaking_tests {
    use std::collections::HashMap;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::config::{AgentTemplate, OpponentTuning};

    fn roster() -> Roster {
        Roster::new("lc0", "/data/nets")
            .with_agent(
                "lc0",
                AgentTemplate::new("/bin/lc0")
                    .with_option("Threads", "1")
                    .with_training_data(),
            )
            .with_agent(
                "sf9",
                AgentTemplate::new("/bin/stockfish").with_option("Threads", "2"),
            )
            .with_agent("sf9_s1", AgentTemplate::new("/bin/stockfish"))
    }

    fn transient() -> TransientConfig {
        let mut config = TransientConfig::new();
        config.insert("sf9".to_string(), OpponentTuning::new(3200, 3));
        config.insert("sf9_s1".to_string(), OpponentTuning::new(20000, 1));
        config.insert(
            "lc0".to_string(),
            OpponentTuning::new(800, 0).with_net("run1.pb.gz"),
        );
        config
    }

    #[test]
    fn builds_config_with_live_budget_and_merged_options() {
        let mut live = transient();
        live.get_mut("sf9").unwrap().options =
            [("Threads".to_string(), "4".to_string())].into_iter().collect();

        let config = build_agent_config("sf9", &roster(), &live).unwrap();
        assert_eq!(config.command, "/bin/stockfish");
        assert_eq!(config.nodes, 3200);
        // live override wins over the template's Threads=2
        assert_eq!(config.options["Threads"], "4");
        assert!(!config.collect_training_data);
    }

    #[test]
    fn net_reference_rewrites_weights_option() {
        let config = build_agent_config("lc0", &roster(), &transient()).unwrap();
        assert_eq!(config.nodes, 800);
        assert!(config.collect_training_data);
        let weights = &config.options[WEIGHTS_OPTION];
        assert!(weights.starts_with("/data/nets"));
        assert!(weights.ends_with("run1.pb.gz"));
    }

    #[test]
    fn unknown_ids_are_rejected_on_both_sides() {
        let mut live = transient();
        live.insert("ghost".to_string(), OpponentTuning::new(1, 1));

        assert!(matches!(
            build_agent_config("ghost", &roster(), &live),
            Err(UnknownOpponentError::MissingTemplate(_))
        ));
        assert!(matches!(
            build_agent_config("sf9", &roster(), &TransientConfig::new()),
            Err(UnknownOpponentError::MissingTuning(_))
        ));
    }

    #[test]
    fn selection_respects_weights() {
        let roster = roster();
        let live = transient();
        let mut rng = StdRng::seed_from_u64(7);

        let mut draws: HashMap<String, usize> = HashMap::new();
        for _ in 0..4000 {
            let id = choose_opponent(&roster, &live, &mut rng).unwrap();
            *draws.entry(id).or_default() += 1;
        }

        // weight 0 entries never drawn
        assert!(!draws.contains_key("lc0"));
        let ratio = draws["sf9"] as f64 / draws["sf9_s1"] as f64;
        assert!((2.5..3.5).contains(&ratio), "ratio {ratio} too far from 3:1");
    }

    #[test]
    fn ids_unknown_to_the_roster_are_not_drawn() {
        let mut live = TransientConfig::new();
        live.insert("ghost".to_string(), OpponentTuning::new(1, 10));
        live.insert("sf9".to_string(), OpponentTuning::new(1, 1));

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(choose_opponent(&roster(), &live, &mut rng).unwrap(), "sf9");
        }
    }

    #[test]
    fn empty_pool_is_an_error() {
        let mut live = TransientConfig::new();
        live.insert("sf9".to_string(), OpponentTuning::new(1, 0));

        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            choose_opponent(&roster(), &live, &mut rng),
            Err(UnknownOpponentError::NoneEligible)
        ));
    }
}
