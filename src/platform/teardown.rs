// ============================================================================
// File: src/platform/teardown.rs
// ----------------------------------------------------------------------------
// Collected teardown failures.
//
// Destroy never fails outwardly. Each failure it swallows is logged and also
// recorded here so callers and tests can see what leaked.
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Step of machine teardown that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeardownStage {
    /// Console fetch or console.txt write
    ConsoleCapture,
    /// Provider termination
    Terminate,
    /// Journal release
    Journal,
}

impl fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::ConsoleCapture => "console capture",
            Self::Terminate => "terminate",
            Self::Journal => "journal release",
        };
        f.write_str(stage)
    }
}

/// One swallowed teardown failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownFailure {
    pub machine: String,
    pub stage: TeardownStage,
    pub message: String,
}

/// Outcome of a Machine, Cluster or Flight teardown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Machines whose teardown ran to completion (with or without failures)
    pub destroyed: Vec<String>,

    /// Failures that were logged and swallowed
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<M: Into<String>, S: Into<String>>(&mut self, machine: M, stage: TeardownStage, message: S) {
        self.failures.push(TeardownFailure {
            machine: machine.into(),
            stage,
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: TeardownReport) {
        self.destroyed.extend(other.destroyed);
        self.failures.extend(other.failures);
    }

    /// True when no failure was swallowed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures recorded at `stage`
    pub fn failures_at(&self, stage: TeardownStage) -> impl Iterator<Item = &TeardownFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_both_sides() {
        let mut first = TeardownReport::new();
        first.destroyed.push("m1".to_string());
        first.record("m1", TeardownStage::ConsoleCapture, "console gone");

        let mut second = TeardownReport::new();
        second.destroyed.push("m2".to_string());
        second.record("m2", TeardownStage::Terminate, "already deleted");

        first.merge(second);

        assert_eq!(first.destroyed, vec!["m1".to_string(), "m2".to_string()]);
        assert!(!first.is_clean());
        assert_eq!(first.failures_at(TeardownStage::Terminate).count(), 1);
        assert_eq!(first.failures_at(TeardownStage::Journal).count(), 0);
    }

    #[test]
    fn stage_display() {
        assert_eq!(TeardownStage::ConsoleCapture.to_string(), "console capture");
        assert_eq!(TeardownStage::Journal.to_string(), "journal release");
    }
}
