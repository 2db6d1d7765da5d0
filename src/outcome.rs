// src/outcome.rs

//! Per-leaf outcome taxonomy.
//!
//! Every step in the engine — a name reconciliation, a copy, an attribute
//! fix — reports exactly one [`Outcome`] and lets its sibling continue. Only
//! a handful of genuinely exceptional conditions (symlink race, recursion
//! overflow, a broken directory invariant after `chdir`) escalate to
//! [`crate::error::Error`] and abort the whole traversal.

use std::fmt;

/// The result of attempting to converge one path toward its promised state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already converged; no action was necessary.
    Noop,
    /// A divergence was found and fixed.
    Change,
    /// A divergence was found but `transaction.action = warn`, so nothing
    /// was fixed.
    Warn,
    /// The action was attempted and did not achieve the promise.
    Fail,
    /// Permission or authentication prevented the action.
    Denied,
    /// An intermediate syscall unexpectedly failed; outcome indeterminate.
    Interrupted,
}

impl Outcome {
    pub fn is_problem(self) -> bool {
        matches!(self, Outcome::Fail | Outcome::Denied | Outcome::Interrupted)
    }

    /// Combine two outcomes from the same leaf (e.g. name-reconcile then
    /// attribute-reconcile) into the one that should be reported for the
    /// leaf as a whole. The more "severe" outcome wins; `Change` beats
    /// `Noop`, `Fail`/`Denied`/`Interrupted` beat everything.
    pub fn combine(self, other: Outcome) -> Outcome {
        use Outcome::*;
        fn rank(o: Outcome) -> u8 {
            match o {
                Noop => 0,
                Change => 1,
                Warn => 2,
                Interrupted => 3,
                Denied => 4,
                Fail => 5,
            }
        }
        if rank(other) > rank(self) { other } else { self }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Noop => "NOOP",
            Outcome::Change => "CHANGE",
            Outcome::Warn => "WARN",
            Outcome::Fail => "FAIL",
            Outcome::Denied => "DENIED",
            Outcome::Interrupted => "INTERRUPTED",
        };
        write!(f, "{s}")
    }
}

/// A single reported divergence or action, attached to the promiser path.
#[derive(Debug, Clone)]
pub struct Report {
    pub promiser: std::path::PathBuf,
    pub outcome: Outcome,
    pub message: String,
    /// Echoed back to the caller only when the outcome is WARN or FAIL.
    pub comment: Option<String>,
}

impl Report {
    pub fn new(promiser: impl Into<std::path::PathBuf>, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            promiser: promiser.into(),
            outcome,
            message: message.into(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        if matches!(self.outcome, Outcome::Warn | Outcome::Fail) {
            self.comment = comment;
        }
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.outcome, self.promiser.display(), self.message)?;
        if let Some(c) = &self.comment {
            write!(f, " ({c})")?;
        }
        Ok(())
    }
}
