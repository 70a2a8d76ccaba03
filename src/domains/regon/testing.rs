//! Scripted in-memory registry client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{Record, RegistryClient, SearchKey, StatusReport};
use crate::core::error::ErrorRecord;

/// Answers queued results first, then falls back to fixed defaults.
///
/// Searches and full reports share one result queue; status lookups have
/// their own.
#[derive(Default)]
pub struct ScriptedClient {
    results: Mutex<VecDeque<Result<Vec<Record>, ErrorRecord>>>,
    statuses: Mutex<VecDeque<Result<StatusReport, ErrorRecord>>>,
    default_records: Vec<Record>,
    delay: Option<Duration>,
    data_calls: AtomicU32,
    status_calls: AtomicU32,
    keys: Mutex<Vec<SearchKey>>,
}

pub fn record(pairs: &[(&str, &str)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records returned when the queue is empty.
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.default_records = records;
        self
    }

    /// Sleep this long inside every data call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_result(&self, result: Result<Vec<Record>, ErrorRecord>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: Result<StatusReport, ErrorRecord>) {
        self.statuses.lock().unwrap().push_back(result);
    }

    /// Number of search and report calls made so far.
    pub fn data_calls(&self) -> u32 {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn searched_keys(&self) -> Vec<SearchKey> {
        self.keys.lock().unwrap().clone()
    }

    async fn next_data(&self) -> Result<Vec<Record>, ErrorRecord> {
        self.data_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.results.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| Ok(self.default_records.clone()))
    }

    fn next_status(&self) -> Result<StatusReport, ErrorRecord> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.statuses.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(StatusReport {
                code: 1,
                message: "Service available".to_string(),
            })
        })
    }
}

#[async_trait]
impl RegistryClient for ScriptedClient {
    async fn search(&self, key: &SearchKey) -> Result<Vec<Record>, ErrorRecord> {
        self.keys.lock().unwrap().push(key.clone());
        self.next_data().await
    }

    async fn full_report(&self, _regon: &str, _report: &str) -> Result<Vec<Record>, ErrorRecord> {
        self.next_data().await
    }

    async fn service_status(&self) -> Result<StatusReport, ErrorRecord> {
        self.next_status()
    }

    async fn data_status(&self) -> Result<Option<String>, ErrorRecord> {
        self.next_status().map(|_| Some("2026-10-16".to_string()))
    }

    async fn last_code(&self) -> Result<StatusReport, ErrorRecord> {
        self.next_status().map(|_| StatusReport {
            code: 0,
            message: String::new(),
        })
    }

    async fn session_status(&self) -> Result<StatusReport, ErrorRecord> {
        self.next_status().map(|_| StatusReport {
            code: 1,
            message: "Session active".to_string(),
        })
    }

    async fn login(&self) -> Result<(), ErrorRecord> {
        self.next_status().map(|_| ())
    }
}
