// 🗄️ Storage Collaborators - the only way the engine touches persistence
//
// The engine reads and appends through these traits; it never owns a
// connection. Two adapters ship with the crate:
// - memory: RwLock-guarded vectors (tests, embedding)
// - sqlite: rusqlite + WAL (CLI and server)

pub mod memory;
pub mod sqlite;

use crate::banking::{BankEntry, NewBankEntry};
use crate::compliance::ComplianceBalance;
use crate::error::ComplianceResult;
use crate::pooling::{NewPoolMember, Pool};
use crate::routes::{Route, RouteFilter};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Current CB per (ship, year). One record per key; upsert replaces it.
pub trait ComplianceRecordStore {
    fn get_balance(&self, ship_id: &str, year: i32) -> ComplianceResult<Option<ComplianceBalance>>;

    fn upsert_balance(&self, balance: &ComplianceBalance) -> ComplianceResult<ComplianceBalance>;

    /// All records for a year, ordered by ship id
    fn list_balances(&self, year: i32) -> ComplianceResult<Vec<ComplianceBalance>>;
}

/// Append-only banking ledger
pub trait LedgerStore {
    fn append_entry(&self, entry: NewBankEntry) -> ComplianceResult<BankEntry>;

    /// Entries for one key, newest first
    fn list_entries(&self, ship_id: &str, year: i32) -> ComplianceResult<Vec<BankEntry>>;
}

/// Pool history. A pool and all its members are written atomically.
pub trait PoolStore {
    fn create_pool(
        &self,
        name: Option<&str>,
        year: i32,
        members: &[NewPoolMember],
    ) -> ComplianceResult<Pool>;

    fn find_pool(&self, id: &str) -> ComplianceResult<Option<Pool>>;

    /// Pools for a year, newest first
    fn list_pools(&self, year: i32) -> ComplianceResult<Vec<Pool>>;
}

pub trait RouteStore {
    fn list_routes(&self, filter: &RouteFilter) -> ComplianceResult<Vec<Route>>;

    fn find_route(&self, route_id: &str) -> ComplianceResult<Option<Route>>;

    /// Insert or replace by route_id. The baseline flag is preserved on replace.
    fn upsert_route(&self, route: &Route) -> ComplianceResult<Route>;

    /// Mark one route as the baseline and clear any previous one
    fn set_baseline(&self, route_id: &str) -> ComplianceResult<Route>;

    fn find_baseline(&self) -> ComplianceResult<Option<Route>>;
}

/// Everything the engine facade needs from one backing store
pub trait ComplianceStore:
    ComplianceRecordStore + LedgerStore + PoolStore + RouteStore + Send + Sync
{
}

impl<T> ComplianceStore for T where
    T: ComplianceRecordStore + LedgerStore + PoolStore + RouteStore + Send + Sync
{
}
