// FuelEU Compliance Engine - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod compliance;     // CB = (target − actual) × energy in scope
pub mod banking;        // Append-only bank ledger
pub mod pooling;        // Pool fairness rules
pub mod routes;         // Voyage data + baseline comparison
pub mod store;          // Collaborator traits + memory / SQLite adapters
pub mod engine;         // Per-key serialized facade
pub mod config;
pub mod import;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use error::{ComplianceError, ComplianceResult};
pub use compliance::{
    compute_balance, BalanceFigures, ComplianceBalance, ComplianceCalculation,
    ComplianceCalculator, DEFAULT_TARGET_INTENSITY, ENERGY_CONVERSION_FACTOR,
};
pub use banking::{BankEntry, BankLedger, BankRecord, EntryType, NewBankEntry};
pub use pooling::{
    validate_pool, NewPoolMember, Pool, PoolCreationRequest, PoolMember, PoolMemberRequest,
    PoolValidationResult, PoolValidator, PoolViolation,
};
pub use routes::{compare_routes, is_compliant, percent_diff, Route, RouteComparison, RouteFilter};
pub use store::{
    ComplianceRecordStore, ComplianceStore, InMemoryStore, LedgerStore, PoolStore, RouteStore,
    SqliteStore,
};
pub use engine::{BaselineSummary, ComparisonReport, ComplianceEngine, PoolOutcome};
pub use config::AppConfig;
pub use import::{import_routes, load_routes_csv, seed_routes, ImportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
