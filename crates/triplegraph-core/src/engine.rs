//! Streaming run driver and run summaries.
//!
//! A parser (or any iterator) pushes statements into a [`StatementSink`]
//! between `on_start` and `on_end`. [`run`] drives that protocol and turns
//! a failure into an [`ImportFailure`] carrying the counters so far.

use crate::error::{ImportError, ImportFailure};
use crate::model::Statement;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Receiver of a statement stream.
pub trait StatementSink {
    type Summary: std::fmt::Debug;

    /// Called once before the first statement.
    fn on_start(&mut self) -> Result<(), ImportError>;

    fn on_statement(&mut self, statement: &Statement) -> Result<(), ImportError>;

    /// Called once after the last statement; flushes whatever is buffered.
    fn on_end(&mut self) -> Result<(), ImportError>;

    /// Counters as of now.
    fn summary(&self) -> Self::Summary;
}

/// Feed `statements` through `sink`.
pub fn run<K, I>(sink: &mut K, statements: I) -> Result<K::Summary, ImportFailure<K::Summary>>
where
    K: StatementSink + ?Sized,
    I: IntoIterator<Item = Statement>,
{
    let fail = |sink: &K, error: ImportError| ImportFailure::new(sink.summary(), error);

    sink.on_start().map_err(|e| fail(sink, e))?;
    for statement in statements {
        sink.on_statement(&statement).map_err(|e| fail(sink, e))?;
    }
    sink.on_end().map_err(|e| fail(sink, e))?;

    let summary = sink.summary();
    debug!(?summary, "Run complete");
    Ok(summary)
}

/// Outcome of a load run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub triples_parsed: u64,
    /// Statements applied by committed flushes
    pub triples_mapped: u64,
    pub flushes: u64,
    /// Flushes rolled back and skipped (only without abort-on-error)
    pub failed_flushes: u64,
    /// Relationships inspected while deduplicating edges
    pub relationships_scanned: u64,
    /// Prefix table after the run (SHORTEN mode)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub namespaces: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ImportSummary {
    pub fn log(&self) {
        info!(
            parsed = self.triples_parsed,
            mapped = self.triples_mapped,
            flushes = self.flushes,
            "Load finished"
        );
    }
}

/// Outcome of a delete run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteSummary {
    pub triples_parsed: u64,
    /// Statements applied by committed flushes
    pub triples_deleted: u64,
    /// Labels, values and edges that were not present
    pub not_deleted: u64,
    /// Statements skipped for involving a blank node
    pub blank_node_statements: u64,
    /// Identity-only nodes removed after their last statement went
    pub nodes_pruned: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DeleteSummary {
    pub fn log(&self) {
        info!(
            parsed = self.triples_parsed,
            deleted = self.triples_deleted,
            not_deleted = self.not_deleted,
            pruned = self.nodes_pruned,
            "Delete finished"
        );
    }
}

/// Record `message` once, logging it the first time.
pub(crate) fn push_warning(warnings: &mut Vec<String>, message: String) {
    if !warnings.contains(&message) {
        tracing::warn!("{}", message);
        warnings.push(message);
    }
}
