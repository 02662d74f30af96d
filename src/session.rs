// src/session.rs
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregator;
use crate::groups::GroupStore;
use crate::models::{AggregationResult, DateRange, Group, Record, SimilarityPair};
use crate::protocol::{Disambiguation, State, Verdict};
use crate::similarity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a disambiguation run is waiting for a decision")]
    RunInProgress,
    #[error("no cohort records loaded")]
    NoRecords,
}

/// Where a run stands after a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Step {
    Idle,
    Presenting {
        index: usize,
        total: usize,
        pair: SimilarityPair,
    },
    Resolved {
        report: Vec<AggregationResult>,
    },
}

struct Run {
    protocol: Disambiguation,
    range: DateRange,
}

/// Records, confirmed groups and the current run. Groups survive across runs.
pub struct Session {
    cohort_marker: String,
    records: Vec<Record>,
    store: GroupStore,
    run: Option<Run>,
    report: Option<Vec<AggregationResult>>,
}

impl Session {
    pub fn new(cohort_marker: impl Into<String>) -> Self {
        Self {
            cohort_marker: cohort_marker.into(),
            records: Vec::new(),
            store: GroupStore::new(),
            run: None,
            report: None,
        }
    }

    fn presenting(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| matches!(run.protocol.state(), State::Presenting { .. }))
    }

    /// Replaces the record set and returns the number of cohort rows.
    pub fn load_records(&mut self, records: Vec<Record>) -> Result<usize, SessionError> {
        if self.presenting() {
            return Err(SessionError::RunInProgress);
        }
        let cohort = self.count_cohort(&records);
        info!("Loaded {} rows ({} cohort transactions)", records.len(), cohort);
        self.records = records;
        Ok(cohort)
    }

    /// Rows of `records` whose account tag carries the cohort marker.
    pub fn count_cohort(&self, records: &[Record]) -> usize {
        records
            .iter()
            .filter(|r| r.in_cohort(&self.cohort_marker))
            .count()
    }

    /// Computes candidates and starts a run over `range`. With no cohort
    /// rows the run resolves straight to an empty report.
    pub fn process(&mut self, range: DateRange) -> Result<Step, SessionError> {
        if self.presenting() {
            return Err(SessionError::RunInProgress);
        }

        info!("Processing {} to {}", range.start(), range.end());
        let pairs = similarity::find_candidates(&self.records, &self.store, &self.cohort_marker);
        let mut protocol = Disambiguation::new(pairs);
        protocol.start();

        self.run = Some(Run { protocol, range });
        Ok(self.advance())
    }

    /// The pending pair with its position in the run.
    pub fn current(&self) -> Option<(usize, &SimilarityPair)> {
        let run = self.run.as_ref()?;
        match run.protocol.state() {
            State::Presenting { index } => run.protocol.current().map(|pair| (index, pair)),
            _ => None,
        }
    }

    pub fn confirm(&mut self) -> Step {
        self.decide(Verdict::Confirm)
    }

    pub fn reject(&mut self) -> Step {
        self.decide(Verdict::Reject)
    }

    fn decide(&mut self, verdict: Verdict) -> Step {
        let Some(run) = self.run.as_mut() else {
            warn!("{:?} received before any run; ignored", verdict);
            return Step::Idle;
        };
        if run.protocol.is_resolved() {
            warn!("{:?} received after run resolved; ignored", verdict);
            return Step::Idle;
        }
        match verdict {
            Verdict::Confirm => run.protocol.confirm(&mut self.store),
            Verdict::Reject => run.protocol.reject(&mut self.store),
        };
        self.advance()
    }

    /// Reports the pending pair, or aggregates once the run has resolved.
    fn advance(&mut self) -> Step {
        let Some(run) = self.run.as_ref() else {
            return Step::Idle;
        };

        match run.protocol.state() {
            State::Presenting { index } => match run.protocol.current() {
                Some(pair) => Step::Presenting {
                    index,
                    total: run.protocol.len(),
                    pair: pair.clone(),
                },
                None => Step::Idle,
            },
            State::Resolved => {
                let results =
                    aggregator::aggregate(&self.records, &self.store, &run.range, &self.cohort_marker);
                let report = aggregator::rank(results);
                info!("Report ready with {} rows", report.len());
                self.report = Some(report.clone());
                Step::Resolved { report }
            }
            State::Idle => Step::Idle,
        }
    }

    pub fn report(&self) -> Option<&[AggregationResult]> {
        self.report.as_deref()
    }

    pub fn groups(&self) -> &[Group] {
        self.store.groups()
    }

    /// Range of the run that is pending or last resolved.
    pub fn range(&self) -> Option<DateRange> {
        self.run.as_ref().map(|run| run.range)
    }
}
