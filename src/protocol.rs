// src/protocol.rs
use serde::Serialize;
use tracing::{info, warn};

use crate::groups::GroupStore;
use crate::models::SimilarityPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum State {
    Idle,
    Presenting { index: usize },
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Confirm,
    Reject,
}

/// Walks a frozen candidate list one pair at a time. Only a verdict moves it
/// forward; a pair is never shown twice.
#[derive(Debug, Clone)]
pub struct Disambiguation {
    pairs: Vec<SimilarityPair>,
    state: State,
}

impl Disambiguation {
    pub fn new(pairs: Vec<SimilarityPair>) -> Self {
        Self {
            pairs,
            state: State::Idle,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_resolved(&self) -> bool {
        self.state == State::Resolved
    }

    /// Leaves `Idle`. An empty list resolves immediately.
    pub fn start(&mut self) -> State {
        if self.state != State::Idle {
            warn!("Disambiguation already started ({:?})", self.state);
            return self.state;
        }
        self.state = if self.pairs.is_empty() {
            info!("No similar wallet pairs to confirm");
            State::Resolved
        } else {
            info!("Presenting {} similar wallet pairs", self.pairs.len());
            State::Presenting { index: 0 }
        };
        self.state
    }

    /// The pair awaiting a verdict.
    pub fn current(&self) -> Option<&SimilarityPair> {
        match self.state {
            State::Presenting { index } => self.pairs.get(index),
            _ => None,
        }
    }

    pub fn confirm(&mut self, store: &mut GroupStore) -> State {
        self.decide(Verdict::Confirm, store)
    }

    pub fn reject(&mut self, store: &mut GroupStore) -> State {
        self.decide(Verdict::Reject, store)
    }

    /// Applies one verdict to the pending pair. Without a pending pair this
    /// is a logged no-op.
    fn decide(&mut self, verdict: Verdict, store: &mut GroupStore) -> State {
        let State::Presenting { index } = self.state else {
            warn!("{:?} received with no pending pair ({:?}); ignored", verdict, self.state);
            return self.state;
        };
        let Some(pair) = self.pairs.get(index) else {
            self.state = State::Resolved;
            return self.state;
        };

        match verdict {
            Verdict::Confirm => {
                let key = store.merge(&pair.first, &pair.second);
                info!(
                    "Confirmed match {} ({}) ~ {} ({}) into group {}",
                    pair.first.address,
                    pair.first.display_name,
                    pair.second.address,
                    pair.second.display_name,
                    key
                );
            }
            Verdict::Reject => {
                info!("Rejected match {} ~ {}", pair.first.address, pair.second.address);
            }
        }

        let next = index + 1;
        self.state = if next < self.pairs.len() {
            State::Presenting { index: next }
        } else {
            info!("Finished processing all similar wallet pairs");
            State::Resolved
        };
        self.state
    }
}
