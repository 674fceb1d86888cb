//! Scenario sequencing state.
//!
//! Endpoints that must answer differently across repeated calls hold a
//! [`Sequence`] (two-step state machine) or a [`Counter`] obtained from the
//! dispatcher-owned [`ScenarioState`]. The dispatcher resets all of them on
//! every scenario activation, so no sequencing state survives into the next
//! scenario.
//!
//! # Transition table
//!
//! | policy                  | from `First` | from `Second` |
//! |-------------------------|--------------|---------------|
//! | [`Transition::Alternate`] | `Second`   | `First`       |
//! | [`Transition::Latch`]     | `Second`   | `Second`      |
//! | [`Transition::Hold`]      | `First`    | `Second`      |

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Position of a two-step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Initial position
    First,
    /// Position after the first transition
    Second,
}

impl Step {
    const fn to_u8(self) -> u8 {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    const fn from_u8(v: u8) -> Self {
        if v == 0 { Self::First } else { Self::Second }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Second => f.write_str("second"),
        }
    }
}

/// How a [`Sequence`] moves on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    /// Flip on every call: first, second, first, ...
    Alternate,
    /// Move to `Second` on the first call and stay there
    Latch,
    /// Never move (single-shot handlers that always answer the same)
    Hold,
}

impl Transition {
    /// Next step from `step` under this policy.
    #[must_use]
    pub const fn next(self, step: Step) -> Step {
        match (self, step) {
            (Self::Alternate, Step::First) | (Self::Latch, _) => Step::Second,
            (Self::Alternate, Step::Second) => Step::First,
            (Self::Hold, s) => s,
        }
    }
}

/// Two-step state machine with an explicit transition policy.
///
/// [`advance`](Self::advance) reads the current step and applies the
/// transition in one atomic update, so two overlapping requests can never
/// both observe `First` on a latch.
#[derive(Debug)]
pub struct Sequence {
    policy: Transition,
    step: AtomicU8,
}

impl Sequence {
    /// Creates a sequence in the `First` position.
    #[must_use]
    pub const fn new(policy: Transition) -> Self {
        Self {
            policy,
            step: AtomicU8::new(0),
        }
    }

    /// Returns the step *before* transitioning, then transitions.
    pub fn advance(&self) -> Step {
        let prev = self
            .step
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(self.policy.next(Step::from_u8(v)).to_u8())
            })
            .unwrap_or_else(|v| v);
        Step::from_u8(prev)
    }

    /// Current step without transitioning.
    #[must_use]
    pub fn current(&self) -> Step {
        Step::from_u8(self.step.load(Ordering::SeqCst))
    }

    /// Returns to `First`.
    pub fn reset(&self) {
        self.step.store(Step::First.to_u8(), Ordering::SeqCst);
    }

    /// The transition policy.
    #[must_use]
    pub const fn policy(&self) -> Transition {
        self.policy
    }
}

/// Saturating call counter (1-indexed on increment).
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
}

impl Counter {
    /// Creates a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Increments and returns the new count (first call returns 1).
    pub fn increment(&self) -> u64 {
        let prev = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_add(1))
            })
            .unwrap_or_else(|v| v);
        prev.saturating_add(1)
    }

    /// Current count.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Back to zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

/// Named sequencing state shared between the dispatcher and the handler
/// factories it invokes.
///
/// Factories ask for state by name; asking twice for the same name returns
/// the same object, so rules built in one activation share it.
#[derive(Debug, Default)]
pub struct ScenarioState {
    sequences: DashMap<String, Arc<Sequence>>,
    counters: DashMap<String, Arc<Counter>>,
}

impl ScenarioState {
    /// Creates empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sequence called `name`, creating it with `policy` if it
    /// does not exist yet.
    ///
    /// A name keeps the policy it was first created with.
    pub fn sequence(&self, name: &str, policy: Transition) -> Arc<Sequence> {
        let entry = self
            .sequences
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Sequence::new(policy)));
        if entry.policy() != policy {
            tracing::warn!(
                sequence = name,
                existing = ?entry.policy(),
                requested = ?policy,
                "sequence requested with a different policy; keeping the original"
            );
        }
        Arc::clone(&entry)
    }

    /// Returns the counter called `name`, creating it at zero.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        Arc::clone(
            &self
                .counters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Counter::new())),
        )
    }

    /// Resets every sequence to `First` and every counter to zero.
    ///
    /// Objects stay registered, so rules still holding them see the reset.
    pub fn reset_all(&self) {
        for seq in &self.sequences {
            seq.reset();
        }
        for counter in &self.counters {
            counter.reset();
        }
    }

    /// Snapshot of all sequence positions, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Step)> {
        let mut steps: Vec<(String, Step)> = self
            .sequences
            .iter()
            .map(|e| (e.key().clone(), e.value().current()))
            .collect();
        steps.sort_by(|a, b| a.0.cmp(&b.0));
        steps
    }
}
