//! Execution bookkeeping kept between polls.

use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use super::model::{ExecutionKey, MultiphaseQueryExecution};
use crate::backend::{ExecutionState, StatementExecutionStatus};
use crate::retained::Retained;

/// Terminal statuses an [`InMemoryLedger`] keeps by default.
pub const DEFAULT_TERMINAL_RETENTION: usize = 1024;

/// Records what the orchestrator has observed about executions.
pub trait ExecutionLedger: Send + Sync {
    /// Record a polled status and return the status to report.
    ///
    /// The reported state never moves backwards. Once terminal, the first
    /// terminal status is returned for every later observation.
    fn observe(&self, key: &ExecutionKey, status: StatementExecutionStatus) -> StatementExecutionStatus;

    fn last_status(&self, key: &ExecutionKey) -> Option<StatementExecutionStatus>;

    /// Store a multiphase record under [`MultiphaseQueryExecution::key`].
    fn save_multiphase(&self, execution: MultiphaseQueryExecution);

    fn multiphase(&self, key: &ExecutionKey) -> Option<MultiphaseQueryExecution>;

    /// Apply `update` to a multiphase record, excluding concurrent updates.
    ///
    /// Returns false when no record is held.
    fn update_multiphase(
        &self,
        key: &ExecutionKey,
        update: &mut dyn FnMut(&mut MultiphaseQueryExecution),
    ) -> bool;

    fn remove_multiphase(&self, key: &ExecutionKey);
}

/// Process-local ledger.
///
/// In-flight statuses and multiphase records are held until the execution
/// turns terminal. Terminal statuses are then kept for the most recent
/// `retention` executions; polls of older ones go back to the backend.
#[derive(Debug)]
pub struct InMemoryLedger {
    in_flight: DashMap<ExecutionKey, StatementExecutionStatus>,
    terminal: Mutex<Retained<ExecutionKey, StatementExecutionStatus>>,
    multiphase: DashMap<ExecutionKey, MultiphaseQueryExecution>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::with_retention(DEFAULT_TERMINAL_RETENTION)
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            in_flight: DashMap::new(),
            terminal: Mutex::new(Retained::new(retention)),
            multiphase: DashMap::new(),
        }
    }

    /// Executions not yet terminal, single statements and multiphase
    /// records together.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len() + self.multiphase.len()
    }

    /// Terminal statuses currently retained.
    pub fn retained(&self) -> usize {
        self.terminal().len()
    }

    fn terminal(&self) -> MutexGuard<'_, Retained<ExecutionKey, StatementExecutionStatus>> {
        self.terminal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ExecutionLedger for InMemoryLedger {
    fn observe(&self, key: &ExecutionKey, status: StatementExecutionStatus) -> StatementExecutionStatus {
        // Held throughout so a status turns terminal exactly once.
        let mut terminal = self.terminal();
        if let Some(done) = terminal.get(key) {
            return done.clone();
        }

        let previous = self.in_flight.get(key).map(|s| s.status);
        let state = ExecutionState::advance(previous, status.status);
        let reported = status.with_state(state);
        if state.is_terminal() {
            self.in_flight.remove(key);
            terminal.insert(key.clone(), reported.clone());
        } else {
            self.in_flight.insert(key.clone(), reported.clone());
        }
        reported
    }

    fn last_status(&self, key: &ExecutionKey) -> Option<StatementExecutionStatus> {
        if let Some(done) = self.terminal().get(key) {
            return Some(done.clone());
        }
        self.in_flight.get(key).map(|s| s.value().clone())
    }

    fn save_multiphase(&self, execution: MultiphaseQueryExecution) {
        self.multiphase.insert(execution.key(), execution);
    }

    fn multiphase(&self, key: &ExecutionKey) -> Option<MultiphaseQueryExecution> {
        self.multiphase.get(key).map(|e| e.clone())
    }

    fn update_multiphase(
        &self,
        key: &ExecutionKey,
        update: &mut dyn FnMut(&mut MultiphaseQueryExecution),
    ) -> bool {
        match self.multiphase.get_mut(key) {
            Some(mut execution) => {
                update(execution.value_mut());
                true
            }
            None => false,
        }
    }

    fn remove_multiphase(&self, key: &ExecutionKey) {
        self.multiphase.remove(key);
    }
}
