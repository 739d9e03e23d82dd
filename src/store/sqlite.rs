// 💾 SQLite Store - rusqlite + WAL
//
// Tables:
//   ship_compliance  one row per (ship_id, year), upserted
//   bank_entries     append-only (UPDATE/DELETE rejected by triggers)
//   pools            append-only, written with their members in one transaction
//   pool_members     append-only
//   routes           voyage data, single baseline flag
//   events           audit trail of every write

use crate::banking::{BankEntry, EntryType, NewBankEntry};
use crate::compliance::ComplianceBalance;
use crate::error::{ComplianceError, ComplianceResult};
use crate::pooling::{NewPoolMember, Pool, PoolMember};
use crate::routes::{Route, RouteFilter};
use crate::store::{ComplianceRecordStore, LedgerStore, PoolStore, RouteStore};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

// ============================================================================
// AUDIT EVENT
// ============================================================================

/// Audit trail record ("every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> ComplianceResult<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ship_compliance (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ship_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            target_intensity REAL NOT NULL,
            actual_intensity REAL NOT NULL,
            energy_in_scope REAL NOT NULL,
            compliance_balance REAL NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(ship_id, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bank_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_uuid TEXT UNIQUE NOT NULL,
            ship_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            cb_amount REAL NOT NULL,
            entry_type TEXT NOT NULL CHECK (entry_type IN ('BANK', 'APPLY')),
            description TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pools (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pool_uuid TEXT UNIQUE NOT NULL,
            name TEXT,
            year INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pool_members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_uuid TEXT UNIQUE NOT NULL,
            pool_uuid TEXT NOT NULL REFERENCES pools(pool_uuid),
            ship_id TEXT NOT NULL,
            cb_before REAL NOT NULL,
            cb_after REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS routes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            route_uuid TEXT UNIQUE NOT NULL,
            route_id TEXT UNIQUE NOT NULL,
            vessel_type TEXT NOT NULL,
            fuel_type TEXT NOT NULL,
            year INTEGER NOT NULL,
            ghg_intensity REAL NOT NULL,
            fuel_consumption REAL NOT NULL,
            distance REAL NOT NULL,
            total_emissions REAL NOT NULL,
            is_baseline INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Append-only guards
    // ==========================================================================
    for table in ["bank_entries", "pools", "pool_members"] {
        conn.execute_batch(&format!(
            "CREATE TRIGGER IF NOT EXISTS {table}_no_update BEFORE UPDATE ON {table}
             BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END;
             CREATE TRIGGER IF NOT EXISTS {table}_no_delete BEFORE DELETE ON {table}
             BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END;"
        ))?;
    }

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bank_entries_key ON bank_entries(ship_id, year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pools_year ON pools(year)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pool_members_pool ON pool_members(pool_uuid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    tracing::debug!("compliance schema ready");
    Ok(())
}

/// Fixed-width timestamps so TEXT ordering equals time ordering
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn insert_event(conn: &Connection, event: &Event) -> ComplianceResult<()> {
    let data_json = serde_json::to_string(&event.data)
        .map_err(|e| ComplianceError::Storage(e.to_string()))?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, event_type, entity_type, entity_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
        ],
    )?;

    Ok(())
}

fn balance_from_row(row: &Row) -> rusqlite::Result<ComplianceBalance> {
    Ok(ComplianceBalance {
        ship_id: row.get(0)?,
        year: row.get(1)?,
        target_intensity: row.get(2)?,
        actual_intensity: row.get(3)?,
        energy_in_scope: row.get(4)?,
        compliance_balance: row.get(5)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<BankEntry> {
    let entry_type: String = row.get(4)?;
    let entry_type = EntryType::parse(&entry_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown entry type: {}", entry_type).into(),
        )
    })?;

    Ok(BankEntry {
        id: row.get(0)?,
        ship_id: row.get(1)?,
        year: row.get(2)?,
        cb_amount: row.get(3)?,
        entry_type,
        description: row.get(5)?,
        created_at: parse_timestamp(row, 6)?,
    })
}

fn route_from_row(row: &Row) -> rusqlite::Result<Route> {
    Ok(Route {
        id: row.get(0)?,
        route_id: row.get(1)?,
        vessel_type: row.get(2)?,
        fuel_type: row.get(3)?,
        year: row.get(4)?,
        ghg_intensity: row.get(5)?,
        fuel_consumption: row.get(6)?,
        distance: row.get(7)?,
        total_emissions: row.get(8)?,
        is_baseline: row.get(9)?,
        created_at: parse_timestamp(row, 10)?,
        updated_at: parse_timestamp(row, 11)?,
    })
}

const ROUTE_COLUMNS: &str = "route_uuid, route_id, vessel_type, fuel_type, year, ghg_intensity,
     fuel_consumption, distance, total_emissions, is_baseline, created_at, updated_at";

// ============================================================================
// STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> ComplianceResult<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened compliance database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> ComplianceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> ComplianceResult<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Audit events for an entity, newest first
    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> ComplianceResult<Vec<Event>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, entity_type, entity_id, data
             FROM events
             WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY timestamp DESC, id DESC",
        )?;

        let events = stmt
            .query_map(params![entity_type, entity_id], |row| {
                let data_json: String = row.get(5)?;
                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: parse_timestamp(row, 1)?,
                    event_type: row.get(2)?,
                    entity_type: row.get(3)?,
                    entity_id: row.get(4)?,
                    data: serde_json::from_str(&data_json).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn members_of(conn: &Connection, pool_uuid: &str) -> rusqlite::Result<Vec<PoolMember>> {
        let mut stmt = conn.prepare(
            "SELECT member_uuid, pool_uuid, ship_id, cb_before, cb_after, created_at
             FROM pool_members
             WHERE pool_uuid = ?1
             ORDER BY id ASC",
        )?;

        let members = stmt
            .query_map([pool_uuid], |row| {
                Ok(PoolMember {
                    id: row.get(0)?,
                    pool_id: row.get(1)?,
                    ship_id: row.get(2)?,
                    cb_before: row.get(3)?,
                    cb_after: row.get(4)?,
                    created_at: parse_timestamp(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(members)
    }

    fn pools_where(
        conn: &Connection,
        clause: &str,
        param: &dyn rusqlite::ToSql,
    ) -> rusqlite::Result<Vec<Pool>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT pool_uuid, name, year, created_at FROM pools WHERE {} ORDER BY created_at DESC, id DESC",
            clause
        ))?;

        let headers = stmt
            .query_map([param], |row| {
                Ok(Pool {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    year: row.get(2)?,
                    created_at: parse_timestamp(row, 3)?,
                    members: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        headers
            .into_iter()
            .map(|mut pool| -> rusqlite::Result<Pool> {
                pool.members = Self::members_of(conn, &pool.id)?;
                Ok(pool)
            })
            .collect()
    }
}

impl ComplianceRecordStore for SqliteStore {
    fn get_balance(&self, ship_id: &str, year: i32) -> ComplianceResult<Option<ComplianceBalance>> {
        let conn = self.conn.lock()?;
        let balance = conn
            .query_row(
                "SELECT ship_id, year, target_intensity, actual_intensity, energy_in_scope, compliance_balance
                 FROM ship_compliance
                 WHERE ship_id = ?1 AND year = ?2",
                params![ship_id, year],
                balance_from_row,
            )
            .optional()?;

        Ok(balance)
    }

    fn upsert_balance(&self, balance: &ComplianceBalance) -> ComplianceResult<ComplianceBalance> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO ship_compliance (
                ship_id, year, target_intensity, actual_intensity,
                energy_in_scope, compliance_balance, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(ship_id, year) DO UPDATE SET
                target_intensity = excluded.target_intensity,
                actual_intensity = excluded.actual_intensity,
                energy_in_scope = excluded.energy_in_scope,
                compliance_balance = excluded.compliance_balance,
                updated_at = excluded.updated_at",
            params![
                balance.ship_id,
                balance.year,
                balance.target_intensity,
                balance.actual_intensity,
                balance.energy_in_scope,
                balance.compliance_balance,
                timestamp(&Utc::now()),
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "balance_recorded",
                "ship_compliance",
                &format!("{}:{}", balance.ship_id, balance.year),
                serde_json::json!({
                    "compliance_balance": balance.compliance_balance,
                    "actual_intensity": balance.actual_intensity,
                    "target_intensity": balance.target_intensity,
                }),
            ),
        )?;

        tx.commit()?;
        Ok(balance.clone())
    }

    fn list_balances(&self, year: i32) -> ComplianceResult<Vec<ComplianceBalance>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ship_id, year, target_intensity, actual_intensity, energy_in_scope, compliance_balance
             FROM ship_compliance
             WHERE year = ?1
             ORDER BY ship_id ASC",
        )?;

        let balances = stmt
            .query_map([year], balance_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(balances)
    }
}

impl LedgerStore for SqliteStore {
    fn append_entry(&self, entry: NewBankEntry) -> ComplianceResult<BankEntry> {
        let entry = entry.into_entry();
        let mut conn = self.conn.lock()?;

        // Entry and its audit event commit together or not at all
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO bank_entries (
                entry_uuid, ship_id, year, cb_amount, entry_type, description, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.ship_id,
                entry.year,
                entry.cb_amount,
                entry.entry_type.as_str(),
                entry.description,
                timestamp(&entry.created_at),
            ],
        )?;

        insert_event(
            &tx,
            &Event::new(
                "bank_entry_appended",
                "bank_entry",
                &entry.id,
                serde_json::json!({
                    "ship_id": entry.ship_id,
                    "year": entry.year,
                    "cb_amount": entry.cb_amount,
                    "entry_type": entry.entry_type.as_str(),
                }),
            ),
        )?;

        tx.commit()?;
        Ok(entry)
    }

    fn list_entries(&self, ship_id: &str, year: i32) -> ComplianceResult<Vec<BankEntry>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entry_uuid, ship_id, year, cb_amount, entry_type, description, created_at
             FROM bank_entries
             WHERE ship_id = ?1 AND year = ?2
             ORDER BY created_at DESC, id DESC",
        )?;

        let entries = stmt
            .query_map(params![ship_id, year], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

impl PoolStore for SqliteStore {
    fn create_pool(
        &self,
        name: Option<&str>,
        year: i32,
        members: &[NewPoolMember],
    ) -> ComplianceResult<Pool> {
        let pool = Pool::assemble(name, year, members);

        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO pools (pool_uuid, name, year, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![pool.id, pool.name, pool.year, timestamp(&pool.created_at)],
        )?;

        for member in &pool.members {
            tx.execute(
                "INSERT INTO pool_members (
                    member_uuid, pool_uuid, ship_id, cb_before, cb_after, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    member.id,
                    member.pool_id,
                    member.ship_id,
                    member.cb_before,
                    member.cb_after,
                    timestamp(&member.created_at),
                ],
            )?;
        }

        insert_event(
            &tx,
            &Event::new(
                "pool_created",
                "pool",
                &pool.id,
                serde_json::json!({
                    "year": pool.year,
                    "members": pool.members.iter().map(|m| &m.ship_id).collect::<Vec<_>>(),
                    "total_after": pool.total_after(),
                }),
            ),
        )?;

        tx.commit()?;
        Ok(pool)
    }

    fn find_pool(&self, id: &str) -> ComplianceResult<Option<Pool>> {
        let conn = self.conn.lock()?;
        let mut pools = Self::pools_where(&conn, "pool_uuid = ?1", &id)?;
        Ok(pools.pop())
    }

    fn list_pools(&self, year: i32) -> ComplianceResult<Vec<Pool>> {
        let conn = self.conn.lock()?;
        Ok(Self::pools_where(&conn, "year = ?1", &year)?)
    }
}

impl RouteStore for SqliteStore {
    fn list_routes(&self, filter: &RouteFilter) -> ComplianceResult<Vec<Route>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM routes
             WHERE (?1 IS NULL OR vessel_type = ?1)
               AND (?2 IS NULL OR fuel_type = ?2)
               AND (?3 IS NULL OR year = ?3)
             ORDER BY route_id ASC",
            ROUTE_COLUMNS
        ))?;

        let routes = stmt
            .query_map(
                params![filter.vessel_type, filter.fuel_type, filter.year],
                route_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(routes)
    }

    fn find_route(&self, route_id: &str) -> ComplianceResult<Option<Route>> {
        let conn = self.conn.lock()?;
        let route = conn
            .query_row(
                &format!("SELECT {} FROM routes WHERE route_id = ?1", ROUTE_COLUMNS),
                [route_id],
                route_from_row,
            )
            .optional()?;

        Ok(route)
    }

    fn upsert_route(&self, route: &Route) -> ComplianceResult<Route> {
        let conn = self.conn.lock()?;

        conn.execute(
            "INSERT INTO routes (
                route_uuid, route_id, vessel_type, fuel_type, year, ghg_intensity,
                fuel_consumption, distance, total_emissions, is_baseline, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(route_id) DO UPDATE SET
                vessel_type = excluded.vessel_type,
                fuel_type = excluded.fuel_type,
                year = excluded.year,
                ghg_intensity = excluded.ghg_intensity,
                fuel_consumption = excluded.fuel_consumption,
                distance = excluded.distance,
                total_emissions = excluded.total_emissions,
                updated_at = excluded.updated_at",
            params![
                route.id,
                route.route_id,
                route.vessel_type,
                route.fuel_type,
                route.year,
                route.ghg_intensity,
                route.fuel_consumption,
                route.distance,
                route.total_emissions,
                route.is_baseline,
                timestamp(&route.created_at),
                timestamp(&Utc::now()),
            ],
        )?;

        let stored = conn.query_row(
            &format!("SELECT {} FROM routes WHERE route_id = ?1", ROUTE_COLUMNS),
            [&route.route_id],
            route_from_row,
        )?;

        Ok(stored)
    }

    fn set_baseline(&self, route_id: &str) -> ComplianceResult<Route> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM routes WHERE route_id = ?1)",
            [route_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(ComplianceError::RouteNotFound(route_id.to_string()));
        }

        let now = timestamp(&Utc::now());
        tx.execute(
            "UPDATE routes SET is_baseline = 0, updated_at = ?1 WHERE is_baseline = 1 AND route_id != ?2",
            params![now, route_id],
        )?;
        tx.execute(
            "UPDATE routes SET is_baseline = 1, updated_at = ?1 WHERE route_id = ?2",
            params![now, route_id],
        )?;

        let baseline = tx.query_row(
            &format!("SELECT {} FROM routes WHERE route_id = ?1", ROUTE_COLUMNS),
            [route_id],
            route_from_row,
        )?;

        tx.commit()?;
        Ok(baseline)
    }

    fn find_baseline(&self) -> ComplianceResult<Option<Route>> {
        let conn = self.conn.lock()?;
        let route = conn
            .query_row(
                &format!("SELECT {} FROM routes WHERE is_baseline = 1 LIMIT 1", ROUTE_COLUMNS),
                [],
                route_from_row,
            )
            .optional()?;

        Ok(route)
    }
}

// ============================================================================
// TESTS
// ============================================================================
