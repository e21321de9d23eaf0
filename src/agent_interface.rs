//! Capability traits the league consumes but does not implement.
//!
//! The league never talks to an agent process directly: move requests, option
//! negotiation and line-level parsing all live behind [`AgentHandle`], which an
//! embedding application implements over its transport of choice (UCI pipes, TCP,
//! in-process stubs for tests). Likewise the game rules live behind [`GameState`],
//! which only has to provide turn alternation and terminal-result detection.

use crate::config::AgentConfig;
use crate::error::AgentTransportError;

/// A handle to one running agent process.
///
/// All requests are blocking; request/response serialization is owned by the
/// implementation. Implementations must report an agent that died mid-request as
/// [`AgentTransportError::Terminated`] so the orchestrator can tell it apart from
/// a malformed response.
pub trait AgentHandle {
    /// Block until the agent reports it is ready for the next command.
    fn set_ready(&mut self) -> Result<(), AgentTransportError>;

    /// Push the current position to the agent.
    fn push_position(&mut self, position: &str) -> Result<(), AgentTransportError>;

    /// Ask for a move, bounded by `nodes` search effort.
    fn request_move(&mut self, nodes: i64) -> Result<String, AgentTransportError>;

    /// Ask for the supplemental training payload of the last search, if any.
    ///
    /// The payload is hex-encoded, as emitted on the wire.
    fn request_training_data(&mut self) -> Result<Option<String>, AgentTransportError>;

    /// Stop the agent process. Must be idempotent and must not fail.
    fn terminate(&mut self);
}

/// Launches agent processes from a built [`AgentConfig`].
///
/// `launch` is expected to start the process, apply the option overrides and wait
/// for the initial handshake. Failures (including transient resource exhaustion)
/// are retried with backoff by the calling worker.
pub trait AgentFactory {
    /// Start an agent and hand back its handle.
    fn launch(&self, config: &AgentConfig) -> anyhow::Result<Box<dyn AgentHandle + Send>>;
}

/// The external game-state collaborator: a board/position tracker.
pub trait GameState {
    /// Encoded current position, as pushed to the acting agent.
    fn position(&self) -> String;

    /// Which configured agent acts now: `0` for the first, `1` for the second.
    fn side_to_move(&self) -> usize;

    /// Advance the game with the returned move.
    ///
    /// # Errors
    /// Returned when the move cannot be applied (illegal or unparsable).
    fn apply_move(&mut self, mv: &str) -> anyhow::Result<()>;

    /// True once the position is terminal.
    fn is_terminal(&self) -> bool;

    /// Terminal result from the first-configured agent's perspective: +1/0/-1.
    fn result(&self) -> i8;
}

/// Creates fresh games, one per match.
pub trait GameStateFactory<G: GameState> {
    /// Returns a game in its starting position.
    fn new_game(&self) -> G;
}

#[cfg(test)]
mod interface_tests {
    use super::*;

    struct DummyGame(usize);

    impl GameState for DummyGame {
        fn position(&self) -> String {
            format!("ply {}", self.0)
        }

        fn side_to_move(&self) -> usize {
            self.0 % 2
        }

        fn apply_move(&mut self, _mv: &str) -> anyhow::Result<()> {
            self.0 += 1;
            Ok(())
        }

        fn is_terminal(&self) -> bool {
            self.0 >= 2
        }

        fn result(&self) -> i8 {
            1
        }
    }

    struct DummyFactory;

    impl GameStateFactory<DummyGame> for DummyFactory {
        fn new_game(&self) -> DummyGame {
            DummyGame(0)
        }
    }

    fn borrow_game<G: GameState>(game: &G) -> String {
        game.position()
    }

    #[test]
    fn game_trait_is_usable_generically() {
        let factory = DummyFactory;
        let mut game = factory.new_game();
        assert_eq!(borrow_game(&game), "ply 0");
        assert_eq!(game.side_to_move(), 0);
        game.apply_move("x").unwrap();
        assert_eq!(game.side_to_move(), 1);
        game.apply_move("y").unwrap();
        assert!(game.is_terminal());
        assert_eq!(game.result(), 1);
    }
}
