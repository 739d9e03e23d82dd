// 🧠 In-Memory Store - append-only vectors behind RwLocks
//
// Same contract as the SQLite store, no I/O. Ledger entries and pools are
// only ever pushed, never edited or removed.

use crate::banking::{BankEntry, NewBankEntry};
use crate::compliance::ComplianceBalance;
use crate::error::{ComplianceError, ComplianceResult};
use crate::pooling::{NewPoolMember, Pool};
use crate::routes::{Route, RouteFilter};
use crate::store::{ComplianceRecordStore, LedgerStore, PoolStore, RouteStore};
use chrono::Utc;
use std::sync::{Arc, RwLock};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    balances: Arc<RwLock<Vec<ComplianceBalance>>>,
    entries: Arc<RwLock<Vec<BankEntry>>>,
    pools: Arc<RwLock<Vec<Pool>>>,
    routes: Arc<RwLock<Vec<Route>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComplianceRecordStore for InMemoryStore {
    fn get_balance(&self, ship_id: &str, year: i32) -> ComplianceResult<Option<ComplianceBalance>> {
        let balances = self.balances.read()?;
        Ok(balances
            .iter()
            .find(|b| b.ship_id == ship_id && b.year == year)
            .cloned())
    }

    fn upsert_balance(&self, balance: &ComplianceBalance) -> ComplianceResult<ComplianceBalance> {
        let mut balances = self.balances.write()?;

        // One record per (ship, year)
        balances.retain(|b| !(b.ship_id == balance.ship_id && b.year == balance.year));
        balances.push(balance.clone());

        Ok(balance.clone())
    }

    fn list_balances(&self, year: i32) -> ComplianceResult<Vec<ComplianceBalance>> {
        let balances = self.balances.read()?;
        let mut for_year: Vec<ComplianceBalance> =
            balances.iter().filter(|b| b.year == year).cloned().collect();
        for_year.sort_by(|a, b| a.ship_id.cmp(&b.ship_id));
        Ok(for_year)
    }
}

impl LedgerStore for InMemoryStore {
    fn append_entry(&self, entry: NewBankEntry) -> ComplianceResult<BankEntry> {
        let entry = entry.into_entry();
        self.entries.write()?.push(entry.clone());
        Ok(entry)
    }

    fn list_entries(&self, ship_id: &str, year: i32) -> ComplianceResult<Vec<BankEntry>> {
        let entries = self.entries.read()?;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.ship_id == ship_id && e.year == year)
            .cloned()
            .collect())
    }
}

impl PoolStore for InMemoryStore {
    fn create_pool(
        &self,
        name: Option<&str>,
        year: i32,
        members: &[NewPoolMember],
    ) -> ComplianceResult<Pool> {
        let pool = Pool::assemble(name, year, members);
        self.pools.write()?.push(pool.clone());
        Ok(pool)
    }

    fn find_pool(&self, id: &str) -> ComplianceResult<Option<Pool>> {
        let pools = self.pools.read()?;
        Ok(pools.iter().find(|p| p.id == id).cloned())
    }

    fn list_pools(&self, year: i32) -> ComplianceResult<Vec<Pool>> {
        let pools = self.pools.read()?;
        Ok(pools.iter().rev().filter(|p| p.year == year).cloned().collect())
    }
}

impl RouteStore for InMemoryStore {
    fn list_routes(&self, filter: &RouteFilter) -> ComplianceResult<Vec<Route>> {
        let routes = self.routes.read()?;
        let mut matching: Vec<Route> = routes.iter().filter(|r| filter.matches(r)).cloned().collect();
        matching.sort_by(|a, b| a.route_id.cmp(&b.route_id));
        Ok(matching)
    }

    fn find_route(&self, route_id: &str) -> ComplianceResult<Option<Route>> {
        let routes = self.routes.read()?;
        Ok(routes.iter().find(|r| r.route_id == route_id).cloned())
    }

    fn upsert_route(&self, route: &Route) -> ComplianceResult<Route> {
        let mut routes = self.routes.write()?;

        let mut stored = route.clone();
        if let Some(existing) = routes.iter_mut().find(|r| r.route_id == route.route_id) {
            stored.id = existing.id.clone();
            stored.is_baseline = existing.is_baseline;
            stored.created_at = existing.created_at;
            stored.updated_at = Utc::now();
            *existing = stored.clone();
        } else {
            routes.push(stored.clone());
        }

        Ok(stored)
    }

    fn set_baseline(&self, route_id: &str) -> ComplianceResult<Route> {
        let mut routes = self.routes.write()?;

        if !routes.iter().any(|r| r.route_id == route_id) {
            return Err(ComplianceError::RouteNotFound(route_id.to_string()));
        }

        let now = Utc::now();
        let mut baseline = None;
        for route in routes.iter_mut() {
            let is_target = route.route_id == route_id;
            if route.is_baseline != is_target {
                route.is_baseline = is_target;
                route.updated_at = now;
            }
            if is_target {
                baseline = Some(route.clone());
            }
        }

        baseline.ok_or_else(|| ComplianceError::RouteNotFound(route_id.to_string()))
    }

    fn find_baseline(&self) -> ComplianceResult<Option<Route>> {
        let routes = self.routes.read()?;
        Ok(routes.iter().find(|r| r.is_baseline).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(ship_id: &str, year: i32, cb: f64) -> ComplianceBalance {
        ComplianceBalance {
            ship_id: ship_id.to_string(),
            year,
            target_intensity: 89.3368,
            actual_intensity: 88.0,
            energy_in_scope: 1.0,
            compliance_balance: cb,
        }
    }

    #[test]
    fn test_upsert_keeps_one_record_per_key() {
        let store = InMemoryStore::new();

        store.upsert_balance(&balance("R001", 2025, 10.0)).unwrap();
        store.upsert_balance(&balance("R001", 2025, 20.0)).unwrap();
        store.upsert_balance(&balance("R001", 2024, 30.0)).unwrap();

        let current = store.get_balance("R001", 2025).unwrap().unwrap();
        assert_eq!(current.compliance_balance, 20.0);
        assert_eq!(store.list_balances(2025).unwrap().len(), 1);
        assert!(store.get_balance("R002", 2025).unwrap().is_none());
    }

    #[test]
    fn test_entries_listed_newest_first_per_key() {
        let store = InMemoryStore::new();

        store.append_entry(NewBankEntry::bank("R001", 2025, 1.0, None)).unwrap();
        store.append_entry(NewBankEntry::bank("R002", 2025, 5.0, None)).unwrap();
        store.append_entry(NewBankEntry::apply("R001", 2025, 1.0, None)).unwrap();

        let entries = store.list_entries("R001", 2025).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cb_amount, -1.0);
        assert_eq!(entries[1].cb_amount, 1.0);
    }

    #[test]
    fn test_pools_by_year() {
        let store = InMemoryStore::new();
        let members = vec![NewPoolMember {
            ship_id: "R001".to_string(),
            cb_before: 5.0,
            cb_after: 5.0,
        }];

        let first = store.create_pool(Some("A"), 2025, &members).unwrap();
        let second = store.create_pool(None, 2025, &members).unwrap();
        store.create_pool(None, 2024, &members).unwrap();

        let pools = store.list_pools(2025).unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].id, second.id);
        assert_eq!(store.find_pool(&first.id).unwrap().unwrap().name, Some("A".to_string()));
    }

    #[test]
    fn test_single_baseline() {
        let store = InMemoryStore::new();
        store
            .upsert_route(&Route::new("R001", "Container", "HFO", 2024, 91.0, 5000.0, 12000.0, 4500.0))
            .unwrap();
        store
            .upsert_route(&Route::new("R002", "BulkCarrier", "LNG", 2024, 88.0, 4800.0, 11500.0, 4200.0))
            .unwrap();

        store.set_baseline("R001").unwrap();
        store.set_baseline("R002").unwrap();

        let baseline = store.find_baseline().unwrap().unwrap();
        assert_eq!(baseline.route_id, "R002");
        let baselines = store
            .list_routes(&RouteFilter::default())
            .unwrap()
            .into_iter()
            .filter(|r| r.is_baseline)
            .count();
        assert_eq!(baselines, 1);

        assert!(store.set_baseline("R999").unwrap_err().is_not_found());
    }

    #[test]
    fn test_upsert_route_preserves_identity_and_baseline() {
        let store = InMemoryStore::new();
        let original = store
            .upsert_route(&Route::new("R001", "Container", "HFO", 2024, 91.0, 5000.0, 12000.0, 4500.0))
            .unwrap();
        store.set_baseline("R001").unwrap();

        let updated = store
            .upsert_route(&Route::new("R001", "Container", "HFO", 2024, 90.0, 5000.0, 12000.0, 4500.0))
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert!(updated.is_baseline);
        assert_eq!(store.find_route("R001").unwrap().unwrap().ghg_intensity, 90.0);
    }
}
