//! Business-registry collaborator.
//!
//! Tools never talk HTTP themselves: they call a [`RegistryClient`], which
//! hides the GUS BIR 1.1 SOAP service behind a handful of async operations.
//! Records come back as loosely typed JSON objects keyed by the registry's own
//! field names.
//!
//! - `bir.rs` - the real client speaking SOAP 1.2 over `reqwest`
//! - `testing.rs` - a scripted in-memory client for tests

mod bir;
#[cfg(test)]
pub mod testing;

pub use bir::{BirClient, PRODUCTION_ENDPOINT, TEST_ENDPOINT};

use async_trait::async_trait;
use serde::Serialize;

use crate::core::error::ErrorRecord;

/// One registry record (a `<dane>` element of a BIR answer).
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Search criteria accepted by `DaneSzukajPodmioty`.
///
/// Identifiers are expected to be validated and normalized already.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    Nip(String),
    Regon(String),
    Krs(String),
    Nips(Vec<String>),
    Regons9(Vec<String>),
    Krss(Vec<String>),
}

impl SearchKey {
    /// BIR search parameter name.
    pub fn parameter(&self) -> &'static str {
        match self {
            Self::Nip(_) => "Nip",
            Self::Regon(_) => "Regon",
            Self::Krs(_) => "Krs",
            Self::Nips(_) => "Nipy",
            Self::Regons9(_) => "Regony9zn",
            Self::Krss(_) => "Krsy",
        }
    }

    /// Parameter value, lists joined with commas.
    pub fn value(&self) -> String {
        match self {
            Self::Nip(v) | Self::Regon(v) | Self::Krs(v) => v.clone(),
            Self::Nips(vs) | Self::Regons9(vs) | Self::Krss(vs) => vs.join(","),
        }
    }
}

/// A numeric status with its human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub code: i64,
    pub message: String,
}

/// Full report names published for BIR 1.1.
pub const AVAILABLE_REPORTS: &[&str] = &[
    "BIR11OsFizycznaDaneOgolne",
    "BIR11OsFizycznaDzialalnoscCeidg",
    "BIR11OsFizycznaDzialalnoscRolnicza",
    "BIR11OsFizycznaDzialalnoscPozostala",
    "BIR11OsFizycznaListaJednLokalnych",
    "BIR11JednLokalnaOsFizycznej",
    "BIR11OsPrawna",
    "BIR11OsPrawnaDzialalnoscSkreslona",
    "BIR11OsPrawnaPkd",
    "BIR11OsPrawnaListaJednLokalnych",
    "BIR11JednLokalnaOsPrawnej",
    "BIR11TypPodmiotu",
];

/// Service operations exposed by the BIR endpoint.
pub const OPERATIONS: &[&str] = &[
    "Zaloguj",
    "Wyloguj",
    "GetValue",
    "DaneSzukajPodmioty",
    "DanePobierzPelnyRaport",
    "DanePobierzRaportZbiorczy",
];

/// Operations offered by the business registry.
///
/// Errors are already classified: connectivity problems are `Network`,
/// rejected keys are `Authentication`, and registry-side failures are
/// `Upstream` (retryable when transient).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Search entities. An empty vector means nothing matched.
    async fn search(&self, key: &SearchKey) -> Result<Vec<Record>, ErrorRecord>;

    /// Download one full report for a REGON.
    async fn full_report(&self, regon: &str, report: &str) -> Result<Vec<Record>, ErrorRecord>;

    /// Registry availability (`StatusUslugi`).
    async fn service_status(&self) -> Result<StatusReport, ErrorRecord>;

    /// Date of the registry data snapshot (`StanDanych`).
    async fn data_status(&self) -> Result<Option<String>, ErrorRecord>;

    /// Code and message of the last operation in this session.
    async fn last_code(&self) -> Result<StatusReport, ErrorRecord>;

    /// Whether the registry session is still alive (`StatusSesji`).
    async fn session_status(&self) -> Result<StatusReport, ErrorRecord>;

    /// Log in eagerly. Used by the startup probe.
    async fn login(&self) -> Result<(), ErrorRecord>;

    /// Names of the operations the service offers.
    fn operations(&self) -> Vec<String> {
        OPERATIONS.iter().map(|s| s.to_string()).collect()
    }
}
