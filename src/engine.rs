// ⚓ Compliance Engine - one facade over calculator, ledger and pools
//
// Every bank / apply / pool decision reads state and then appends to it.
// The engine holds a lock per (ship_id, year) across that read-then-append,
// so two requests for the same key can never both pass validation against
// the same snapshot. Pools lock all member keys in sorted order.

use crate::banking::{BankEntry, BankLedger, BankRecord};
use crate::compliance::{ComplianceBalance, ComplianceCalculator};
use crate::error::{ComplianceError, ComplianceResult};
use crate::pooling::{
    NewPoolMember, Pool, PoolCreationRequest, PoolMemberRequest, PoolValidationResult,
    PoolValidator,
};
use crate::routes::{compare_routes, Route, RouteComparison, RouteFilter};
use crate::store::ComplianceStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// KEY LOCKS
// ============================================================================

type LockKey = (String, i32);

/// Mutex per (ship_id, year), created on first use and dropped once idle
#[derive(Default)]
struct KeyLocks {
    table: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    /// Run `f` holding the lock of every distinct ship of `year`, taken in sorted key order
    fn with_keys<'s, T>(
        &self,
        ship_ids: impl IntoIterator<Item = &'s str>,
        year: i32,
        f: impl FnOnce() -> ComplianceResult<T>,
    ) -> ComplianceResult<T> {
        let keys: Vec<LockKey> = ship_ids
            .into_iter()
            .collect::<BTreeSet<&str>>()
            .into_iter()
            .map(|ship_id| (ship_id.to_string(), year))
            .collect();

        let handles = self.acquire(&keys)?;
        let result = lock_all(&handles).and_then(|_guards| f());

        drop(handles);
        self.prune(&keys);
        result
    }

    fn acquire(&self, keys: &[LockKey]) -> ComplianceResult<Vec<Arc<Mutex<()>>>> {
        let mut table = self.table.lock()?;

        Ok(keys
            .iter()
            .map(|key| {
                table
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            })
            .collect())
    }

    /// Drop entries nobody else holds. Handles are only cloned under the table
    /// lock, so a count of 1 here cannot race with a new waiter.
    fn prune(&self, keys: &[LockKey]) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };

        for key in keys {
            if table.get(key).is_some_and(|handle| Arc::strong_count(handle) == 1) {
                table.remove(key);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }
}

fn lock_all(handles: &[Arc<Mutex<()>>]) -> ComplianceResult<Vec<MutexGuard<'_, ()>>> {
    handles
        .iter()
        .map(|handle| handle.lock().map_err(ComplianceError::from))
        .collect()
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A persisted pool together with the validation it passed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolOutcome {
    #[serde(flatten)]
    pub pool: Pool,
    #[serde(flatten)]
    pub validation: PoolValidationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineSummary {
    pub route_id: String,
    pub ghg_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub baseline: BaselineSummary,
    pub comparisons: Vec<RouteComparison>,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ComplianceEngine<S: ComplianceStore> {
    store: Arc<S>,
    calculator: ComplianceCalculator,
    locks: KeyLocks,
}

impl<S: ComplianceStore> ComplianceEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_calculator(Arc::new(store), ComplianceCalculator::new())
    }

    pub fn with_calculator(store: Arc<S>, calculator: ComplianceCalculator) -> Self {
        ComplianceEngine {
            store,
            calculator,
            locks: KeyLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn calculator(&self) -> &ComplianceCalculator {
        &self.calculator
    }

    fn ledger(&self) -> BankLedger<'_> {
        BankLedger::new(&*self.store, &*self.store)
    }

    // ------------------------------------------------------------------------
    // Compliance balances
    // ------------------------------------------------------------------------

    /// Compute a ship's CB and store it as the current record for the year
    pub fn record_balance(
        &self,
        ship_id: &str,
        year: i32,
        fuel_consumption: f64,
        actual_intensity: f64,
        target_intensity: Option<f64>,
    ) -> ComplianceResult<ComplianceBalance> {
        let figures =
            self.calculator
                .compute_balance(fuel_consumption, actual_intensity, target_intensity)?;

        let balance = self.locks.with_keys([ship_id], year, || {
            self.store.upsert_balance(&figures.for_ship(ship_id, year))
        })?;
        tracing::info!(
            ship_id,
            year,
            compliance_balance = balance.compliance_balance,
            "compliance balance recorded"
        );
        Ok(balance)
    }

    pub fn get_balance(&self, ship_id: &str, year: i32) -> ComplianceResult<ComplianceBalance> {
        self.store
            .get_balance(ship_id, year)?
            .ok_or_else(|| ComplianceError::not_found(ship_id, year))
    }

    /// Every recorded CB for a year, ordered by ship id
    pub fn adjusted_balances(&self, year: i32) -> ComplianceResult<Vec<ComplianceBalance>> {
        self.store.list_balances(year)
    }

    // ------------------------------------------------------------------------
    // Banking
    // ------------------------------------------------------------------------

    pub fn bank(
        &self,
        ship_id: &str,
        year: i32,
        amount: f64,
        description: Option<String>,
    ) -> ComplianceResult<BankEntry> {
        let outcome = self.locks.with_keys([ship_id], year, || {
            self.ledger().bank(ship_id, year, amount, description)
        });

        match outcome {
            Ok(entry) => {
                tracing::info!(ship_id, year, amount, entry_id = %entry.id, "surplus banked");
                Ok(entry)
            }
            Err(err) => {
                tracing::warn!(ship_id, year, amount, error = %err, "bank rejected");
                Err(err)
            }
        }
    }

    pub fn apply(
        &self,
        ship_id: &str,
        year: i32,
        amount: f64,
        description: Option<String>,
    ) -> ComplianceResult<BankEntry> {
        let outcome = self.locks.with_keys([ship_id], year, || {
            self.ledger().apply(ship_id, year, amount, description)
        });

        match outcome {
            Ok(entry) => {
                tracing::info!(ship_id, year, amount, entry_id = %entry.id, "banked surplus applied");
                Ok(entry)
            }
            Err(err) => {
                tracing::warn!(ship_id, year, amount, error = %err, "apply rejected");
                Err(err)
            }
        }
    }

    pub fn bank_record(&self, ship_id: &str, year: i32) -> ComplianceResult<BankRecord> {
        self.ledger().get_record(ship_id, year)
    }

    // ------------------------------------------------------------------------
    // Pooling
    // ------------------------------------------------------------------------

    fn check_members(members: &[PoolMemberRequest]) -> ComplianceResult<()> {
        if members.is_empty() {
            return Err(ComplianceError::invalid("pool requires at least one member"));
        }

        let mut seen = BTreeSet::new();
        for member in members {
            if !seen.insert(member.ship_id.as_str()) {
                return Err(ComplianceError::invalid(format!(
                    "ship {} is listed more than once",
                    member.ship_id
                )));
            }
        }

        Ok(())
    }

    /// Current CB of every member. NotFound for the first ship without a record.
    fn snapshot(
        &self,
        members: &[PoolMemberRequest],
        year: i32,
    ) -> ComplianceResult<BTreeMap<String, f64>> {
        members
            .iter()
            .map(|member| {
                let balance = self.get_balance(&member.ship_id, year)?;
                Ok((member.ship_id.clone(), balance.compliance_balance))
            })
            .collect()
    }

    /// Validate and persist a pool. Nothing is written unless every rule holds.
    pub fn create_pool(&self, request: &PoolCreationRequest) -> ComplianceResult<PoolOutcome> {
        Self::check_members(&request.members)?;

        self.locks.with_keys(
            request.members.iter().map(|m| m.ship_id.as_str()),
            request.year,
            || self.create_pool_locked(request),
        )
    }

    fn create_pool_locked(&self, request: &PoolCreationRequest) -> ComplianceResult<PoolOutcome> {
        let cb_before = self.snapshot(&request.members, request.year)?;
        let validation = PoolValidator::validate_pool(&request.members, &cb_before);

        if !validation.valid {
            tracing::warn!(
                year = request.year,
                members = request.members.len(),
                violations = validation.errors.len(),
                "pool rejected"
            );
            return Err(ComplianceError::invalid_with_details(
                "Pool validation failed",
                validation.errors.clone(),
            ));
        }

        let members: Vec<NewPoolMember> = request
            .members
            .iter()
            .map(|m| NewPoolMember {
                ship_id: m.ship_id.clone(),
                cb_before: cb_before[&m.ship_id],
                cb_after: m.adjusted_cb,
            })
            .collect();

        let pool = self
            .store
            .create_pool(request.name.as_deref(), request.year, &members)?;

        tracing::info!(
            pool_id = %pool.id,
            year = pool.year,
            members = pool.members.len(),
            total_after = pool.total_after(),
            "pool created"
        );

        Ok(PoolOutcome { pool, validation })
    }

    /// Same lookups and rules as `create_pool`, without persisting
    pub fn validate_pool_request(
        &self,
        request: &PoolCreationRequest,
    ) -> ComplianceResult<PoolValidationResult> {
        Self::check_members(&request.members)?;
        let cb_before = self.snapshot(&request.members, request.year)?;
        Ok(PoolValidator::validate_pool(&request.members, &cb_before))
    }

    pub fn list_pools(&self, year: i32) -> ComplianceResult<Vec<Pool>> {
        self.store.list_pools(year)
    }

    // ------------------------------------------------------------------------
    // Routes
    // ------------------------------------------------------------------------

    /// Store a route and record the CB of the ship sailing it. A route whose
    /// CB cannot be computed is rejected before anything is written.
    pub fn upsert_route(&self, route: &Route) -> ComplianceResult<(Route, ComplianceBalance)> {
        let balance = route.compliance_balance(&self.calculator)?;

        let (stored, balance) = self.locks.with_keys([route.route_id.as_str()], route.year, || {
            let stored = self.store.upsert_route(route)?;
            let balance = self.store.upsert_balance(&balance)?;
            Ok((stored, balance))
        })?;

        tracing::info!(
            route_id = %stored.route_id,
            year = stored.year,
            compliance_balance = balance.compliance_balance,
            "route stored"
        );
        Ok((stored, balance))
    }

    pub fn list_routes(&self, filter: &RouteFilter) -> ComplianceResult<Vec<Route>> {
        self.store.list_routes(filter)
    }

    pub fn set_baseline(&self, route_id: &str) -> ComplianceResult<Route> {
        let route = self.store.set_baseline(route_id)?;
        tracing::info!(route_id, ghg_intensity = route.ghg_intensity, "baseline set");
        Ok(route)
    }

    pub fn compare(&self, filter: &RouteFilter) -> ComplianceResult<ComparisonReport> {
        let baseline = self
            .store
            .find_baseline()?
            .ok_or(ComplianceError::NoBaseline)?;
        let routes = self.store.list_routes(filter)?;

        Ok(ComparisonReport {
            baseline: BaselineSummary {
                route_id: baseline.route_id.clone(),
                ghg_intensity: baseline.ghg_intensity,
            },
            comparisons: compare_routes(&baseline, &routes),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
