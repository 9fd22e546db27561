//! Clinical insight engine.
//!
//! Independent analytical rules read clinical records through a
//! [`ClinicalDataSource`], compare a statistic with a published benchmark and
//! emit at most one [`InsightCard`] each. The [`InsightEngine`] runs them
//! concurrently and ranks the result; the [`DismissalLedger`] hides cards a
//! clinician dismissed for the day.

pub mod benchmarks;
pub mod dismissal;
pub mod engine;
pub mod helpers;
pub mod messages;
pub mod privacy;
pub mod rules;
pub mod source;
pub mod types;

pub use benchmarks::{Benchmark, BenchmarkError, InsightBenchmarks, ProvenanceEntry};
pub use dismissal::{
    dismissal_key, parse_dismissal_key, DismissalError, DismissalLedger, DismissalStore,
    MemoryDismissalStore, SqliteDismissalStore,
};
pub use engine::{EngineOptions, InsightEngine};
pub use privacy::{require_k_anonymity, K_ANONYMITY_FLOOR};
pub use rules::{InsightRule, RuleContext, RuleRegistry};
pub use source::{ClinicalDataSource, DateRange, SnapshotSource, SqliteSource};
pub use types::*;
