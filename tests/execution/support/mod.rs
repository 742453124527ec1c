#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use reportal::backend::{
    BackendDriver, BackendError, BackendResult, SqliteDriver, StatementTarget, Vendor,
    VendorStatus,
};
use reportal::definition::InMemoryDefinitionStore;
use reportal::value::{Row, Value};

pub const DEFINITIONS: &str = include_str!("../../fixtures/external_movements.json");

pub const MOVEMENTS: &str = "
    CREATE TABLE movements (
        prison_number TEXT, name TEXT, date TEXT, direction TEXT,
        origin_code TEXT, destination_code TEXT, reason TEXT, is_closed INTEGER
    );
    INSERT INTO movements VALUES
        ('A1234AA', 'Ann Smith', '2023-04-25', 'in',  'PTI', 'LEI', 'Transfer', 0),
        ('A1234AB', 'Bob Jones', '2023-04-30', 'out', 'LEI', 'BXI', 'Court',    1),
        ('A1234AC', 'Cat Brown', '2023-05-01', 'in',  'MDI', 'LEI', 'Transfer', 0),
        ('A1234AD', 'Dan White', '2023-04-28', 'in',  'LEI', 'MDI', 'Release',  0),
        ('A1234AE', 'Eve Black', '2023-03-01', 'in',  'BXI', 'LEI', 'Transfer', 0),
        ('A1234AA', 'Ann Smith', '2023-04-10', 'out', 'LEI', 'PTI', 'Transfer', 0);
";

pub fn definitions() -> Arc<InMemoryDefinitionStore> {
    Arc::new(InMemoryDefinitionStore::from_json_str(DEFINITIONS).unwrap())
}

pub fn sqlite() -> Arc<SqliteDriver> {
    let driver = SqliteDriver::open_in_memory("local", "reports").unwrap();
    driver.seed(MOVEMENTS).unwrap();
    Arc::new(driver)
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// A driver that replays scripted vendor states and records what it was
/// asked to do.
///
/// The n-th submitted statement gets execution id `exec-n` and replays the
/// n-th script; the last state of a script repeats.
pub struct ScriptedDriver {
    name: String,
    vendor: Vendor,
    scripts: Mutex<Vec<VecDeque<&'static str>>>,
    pub submitted: Mutex<Vec<String>>,
    pub targets: Mutex<Vec<StatementTarget>>,
    pub cancelled: Mutex<Vec<String>>,
    pub created: Mutex<Vec<(String, String)>>,
    pub queries: Mutex<Vec<String>>,
    busy: Mutex<bool>,
    missing_reads: AtomicUsize,
    cancel_result: bool,
    yield_on_status: bool,
    rows: Vec<Row>,
}

impl ScriptedDriver {
    pub fn new(name: &str, vendor: Vendor) -> Self {
        Self {
            name: name.to_string(),
            vendor,
            scripts: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            busy: Mutex::new(false),
            missing_reads: AtomicUsize::new(0),
            cancel_result: true,
            yield_on_status: false,
            rows: Vec::new(),
        }
    }

    /// Add the state script for the next submitted statement.
    pub fn with_script(self, states: &[&'static str]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push(states.iter().copied().collect());
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Fail the next `reads` queries as if the table did not exist.
    pub fn with_missing_reads(self, reads: usize) -> Self {
        self.missing_reads.store(reads, Ordering::SeqCst);
        self
    }

    pub fn with_cancel_result(mut self, cancelled: bool) -> Self {
        self.cancel_result = cancelled;
        self
    }

    /// Yield to the runtime before answering a status poll, so concurrent
    /// polls interleave.
    pub fn yielding(mut self) -> Self {
        self.yield_on_status = true;
        self
    }

    pub fn busy(self) -> Self {
        *self.busy.lock().unwrap() = true;
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendDriver for ScriptedDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn submit_statement(&self, sql: &str, target: &StatementTarget) -> BackendResult<String> {
        if *self.busy.lock().unwrap() {
            return Err(BackendError::Busy("ActiveStatementsExceededException".into()));
        }
        let mut submitted = self.submitted.lock().unwrap();
        let id = format!("exec-{}", submitted.len());
        submitted.push(sql.to_string());
        self.targets.lock().unwrap().push(target.clone());
        Ok(id)
    }

    async fn status(&self, execution_id: &str) -> BackendResult<VendorStatus> {
        if self.yield_on_status {
            tokio::task::yield_now().await;
        }
        let index: usize = execution_id
            .strip_prefix("exec-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| BackendError::UnknownExecution(execution_id.to_string()))?;
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(index)
            .ok_or_else(|| BackendError::UnknownExecution(execution_id.to_string()))?;
        let state = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            *script.front().unwrap()
        };
        let status = VendorStatus::new(state);
        Ok(if state == "FAILED" {
            status
                .with_error("relation does not exist")
                .with_error_category("USER_ERROR")
        } else {
            status
        })
    }

    async fn cancel(&self, execution_id: &str) -> BackendResult<bool> {
        self.cancelled.lock().unwrap().push(execution_id.to_string());
        Ok(self.cancel_result)
    }

    async fn query(&self, sql: &str) -> BackendResult<Vec<Row>> {
        self.queries.lock().unwrap().push(sql.to_string());
        let missing = self
            .missing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missing {
            return Err(BackendError::EntityNotFound(sql.to_string()));
        }
        Ok(self.rows.clone())
    }

    async fn table_exists(&self, table: &str) -> BackendResult<bool> {
        Ok(self.created().iter().any(|(t, _)| t == table))
    }

    async fn create_as_select(&self, table: &str, select: &str) -> BackendResult<()> {
        self.created
            .lock()
            .unwrap()
            .push((table.to_string(), select.to_string()));
        Ok(())
    }
}
