//! Run state machine — legal transition table and guarded `advance`.
//!
//! ```text
//! Pending → Analyzing
//! Analyzing → Optimizing
//! Optimizing → DraftingCoverLetter | Completed
//! DraftingCoverLetter → Completed
//! any non-terminal → Failed | Cancelled
//! ```

use std::fmt;

use chrono::Utc;
use tracing::{error, info};

use crate::models::run::{PipelineRun, RunState, TransitionRecord};

fn is_legal_transition(from: RunState, to: RunState) -> bool {
    use RunState::*;

    if matches!(to, Failed | Cancelled) && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Pending, Analyzing)
            | (Analyzing, Optimizing)
            | (Optimizing, DraftingCoverLetter)
            | (Optimizing, Completed)
            | (DraftingCoverLetter, Completed)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: RunState,
    pub to: RunState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Moves `run` to `to` if the edge is legal and records the transition.
/// Illegal edges leave the run untouched and are logged.
pub fn advance(run: &mut PipelineRun, to: RunState) -> Result<(), IllegalTransition> {
    let from = run.state;
    if !is_legal_transition(from, to) {
        error!(run_id = %run.id, "rejected illegal transition {from} → {to}");
        return Err(IllegalTransition { from, to });
    }

    let at = Utc::now();
    run.transitions.push(TransitionRecord { from, to, at });
    run.state = to;
    run.updated_at = at;
    info!(run_id = %run.id, "run state {from} → {to}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_with_cover_letter() {
        let mut run = PipelineRun::new(true, vec![]);
        for to in [
            RunState::Analyzing,
            RunState::Optimizing,
            RunState::DraftingCoverLetter,
            RunState::Completed,
        ] {
            advance(&mut run, to).unwrap();
        }
        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.transitions.len(), 4);
        assert_eq!(run.transitions[0].from, RunState::Pending);
    }

    #[test]
    fn test_cover_letter_can_be_skipped() {
        assert!(is_legal_transition(RunState::Optimizing, RunState::Completed));
    }

    #[test]
    fn test_cannot_skip_analysis() {
        let mut run = PipelineRun::new(false, vec![]);
        let err = advance(&mut run, RunState::Optimizing).unwrap_err();
        assert_eq!(err.from, RunState::Pending);
        assert_eq!(run.state, RunState::Pending);
        assert!(run.transitions.is_empty());
    }

    #[test]
    fn test_failed_and_cancelled_reachable_from_non_terminal_only() {
        for from in [
            RunState::Pending,
            RunState::Analyzing,
            RunState::Optimizing,
            RunState::DraftingCoverLetter,
        ] {
            assert!(is_legal_transition(from, RunState::Failed));
            assert!(is_legal_transition(from, RunState::Cancelled));
        }
        for from in [RunState::Completed, RunState::Failed, RunState::Cancelled] {
            assert!(!is_legal_transition(from, RunState::Failed));
            assert!(!is_legal_transition(from, RunState::Analyzing));
        }
    }
}
