//! Scripted in-memory [`DatabaseAdapter`] for tests and dry runs.
//!
//! Nothing is stored: `execute` returns queued result sets in order, logs
//! every statement and fails on configured SQL fragments. `INSERT`
//! statements advance an auto-increment counter exposed via
//! `last_insert_id`.

use objectquel_api::{AdapterError, DatabaseAdapter, Params, Row, Value};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Params,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    results: VecDeque<Vec<Row>>,
    statements: Vec<ExecutedStatement>,
    transactions: Vec<TransactionEvent>,
    fail_on: Vec<String>,
    fail_commit: bool,
    next_insert_id: i64,
    last_insert_id: Option<Value>,
    last_error: Option<String>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next statement that is not an
    /// `INSERT`/`UPDATE`/`DELETE`.
    pub fn push_result(&mut self, rows: Vec<Row>) {
        self.results.push_back(rows);
    }

    pub fn with_result(mut self, rows: Vec<Row>) -> Self {
        self.push_result(rows);
        self
    }

    /// Any statement containing `fragment` fails.
    pub fn fail_on(&mut self, fragment: impl Into<String>) {
        self.fail_on.push(fragment.into());
    }

    /// Every later commit is refused.
    pub fn fail_commit(&mut self) {
        self.fail_commit = true;
    }

    pub fn statements(&self) -> &[ExecutedStatement] {
        &self.statements
    }

    pub fn transaction_log(&self) -> &[TransactionEvent] {
        &self.transactions
    }

    pub fn clear_log(&mut self) {
        self.statements.clear();
        self.transactions.clear();
    }
}

fn is_write(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_uppercase();
    ["INSERT", "UPDATE", "DELETE"]
        .iter()
        .any(|kw| head.starts_with(kw))
}

impl DatabaseAdapter for MemoryAdapter {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>, AdapterError> {
        self.statements.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.clone(),
        });

        if let Some(fragment) = self.fail_on.iter().find(|f| sql.contains(f.as_str())) {
            let message = format!("statement rejected ({fragment})");
            self.last_error = Some(message.clone());
            return Err(AdapterError::new(message));
        }

        if sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            self.next_insert_id += 1;
            self.last_insert_id = Some(Value::Int(self.next_insert_id));
        }
        if is_write(sql) {
            return Ok(Vec::new());
        }
        Ok(self.results.pop_front().unwrap_or_default())
    }

    fn last_insert_id(&self) -> Option<Value> {
        self.last_insert_id.clone()
    }

    fn begin_trans(&mut self) -> Result<(), AdapterError> {
        self.transactions.push(TransactionEvent::Begin);
        Ok(())
    }

    fn commit_trans(&mut self) -> Result<(), AdapterError> {
        if self.fail_commit {
            let message = "commit rejected".to_string();
            self.last_error = Some(message.clone());
            return Err(AdapterError::new(message));
        }
        self.transactions.push(TransactionEvent::Commit);
        Ok(())
    }

    fn rollback_trans(&mut self) -> Result<(), AdapterError> {
        self.transactions.push(TransactionEvent::Rollback);
        Ok(())
    }

    fn last_error_message(&self) -> Option<String> {
        self.last_error.clone()
    }
}
