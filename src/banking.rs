// 🏦 Bank Ledger - append-only banking of compliance surplus
//
// Every operation is an immutable fact (BankEntry). Nothing stores a
// "current balance": it is folded from the entries on every read.
//
//   total_banked      = Σ BANK amounts
//   total_applied     = Σ |APPLY amounts|
//   available_balance = total_banked − total_applied
//
// Legality is checked against live state before each append, so every
// prefix of the ledger is a legal history.

use crate::error::{ComplianceError, ComplianceResult};
use crate::store::{ComplianceRecordStore, LedgerStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENTRY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Surplus reserved for later use (stored positive)
    Bank,

    /// Banked surplus consumed against a deficit (stored negative)
    Apply,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Bank => "BANK",
            EntryType::Apply => "APPLY",
        }
    }

    pub fn parse(value: &str) -> Option<EntryType> {
        match value {
            "BANK" => Some(EntryType::Bank),
            "APPLY" => Some(EntryType::Apply),
            _ => None,
        }
    }
}

// ============================================================================
// BANK ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntry {
    pub id: String,
    pub ship_id: String,
    pub year: i32,
    /// Signed: positive for BANK, negative for APPLY
    pub cb_amount: f64,
    pub entry_type: EntryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry as handed to the ledger store, before id/timestamp assignment
#[derive(Debug, Clone, PartialEq)]
pub struct NewBankEntry {
    pub ship_id: String,
    pub year: i32,
    pub cb_amount: f64,
    pub entry_type: EntryType,
    pub description: Option<String>,
}

impl NewBankEntry {
    pub fn bank(ship_id: &str, year: i32, amount: f64, description: Option<String>) -> Self {
        NewBankEntry {
            ship_id: ship_id.to_string(),
            year,
            cb_amount: amount.abs(),
            entry_type: EntryType::Bank,
            description,
        }
    }

    pub fn apply(ship_id: &str, year: i32, amount: f64, description: Option<String>) -> Self {
        NewBankEntry {
            ship_id: ship_id.to_string(),
            year,
            cb_amount: -amount.abs(),
            entry_type: EntryType::Apply,
            description,
        }
    }

    /// Stamp with a fresh UUID and the current time
    pub fn into_entry(self) -> BankEntry {
        BankEntry {
            id: uuid::Uuid::new_v4().to_string(),
            ship_id: self.ship_id,
            year: self.year,
            cb_amount: self.cb_amount,
            entry_type: self.entry_type,
            description: self.description,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// BANK RECORD (derived, never stored)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankRecord {
    pub ship_id: String,
    pub year: i32,
    pub total_banked: f64,
    pub total_applied: f64,
    pub available_balance: f64,
    /// Newest first
    pub entries: Vec<BankEntry>,
}

impl BankRecord {
    pub fn from_entries(ship_id: &str, year: i32, mut entries: Vec<BankEntry>) -> Self {
        // Stable sort keeps store order for entries sharing a timestamp
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let (total_banked, total_applied) =
            entries
                .iter()
                .fold((0.0, 0.0), |(banked, applied), entry| match entry.entry_type {
                    EntryType::Bank => (banked + entry.cb_amount, applied),
                    EntryType::Apply => (banked, applied + entry.cb_amount.abs()),
                });

        BankRecord {
            ship_id: ship_id.to_string(),
            year,
            total_banked,
            total_applied,
            available_balance: total_banked - total_applied,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// BANK LEDGER
// ============================================================================

/// Banking rules over explicit collaborators.
///
/// The ledger does not serialize callers: read-then-append atomicity per
/// (ship, year) belongs to whoever drives it (see `ComplianceEngine`).
pub struct BankLedger<'a> {
    records: &'a dyn ComplianceRecordStore,
    entries: &'a dyn LedgerStore,
}

impl<'a> BankLedger<'a> {
    pub fn new(records: &'a dyn ComplianceRecordStore, entries: &'a dyn LedgerStore) -> Self {
        BankLedger { records, entries }
    }

    /// Bank part (or all) of a positive compliance balance.
    ///
    /// Checks in order: record exists, CB > 0, 0 < amount ≤ CB.
    /// The CB record itself is left untouched.
    pub fn bank(
        &self,
        ship_id: &str,
        year: i32,
        amount: f64,
        description: Option<String>,
    ) -> ComplianceResult<BankEntry> {
        let balance = self
            .records
            .get_balance(ship_id, year)?
            .ok_or_else(|| ComplianceError::not_found(ship_id, year))?;

        let current = balance.compliance_balance;
        if current <= 0.0 {
            return Err(ComplianceError::invalid(format!(
                "only positive balance may be banked (current CB: {})",
                current
            )));
        }

        if !(amount > 0.0) {
            return Err(ComplianceError::invalid(format!(
                "bank amount must be positive, got {}",
                amount
            )));
        }

        if amount > current {
            return Err(ComplianceError::invalid(format!(
                "cannot bank more than available compliance balance (requested {}, available {})",
                amount, current
            )));
        }

        self.entries
            .append_entry(NewBankEntry::bank(ship_id, year, amount, description))
    }

    /// Apply banked surplus. Legal against any CB sign.
    pub fn apply(
        &self,
        ship_id: &str,
        year: i32,
        amount: f64,
        description: Option<String>,
    ) -> ComplianceResult<BankEntry> {
        if !(amount > 0.0) {
            return Err(ComplianceError::invalid(format!(
                "apply amount must be positive, got {}",
                amount
            )));
        }

        let record = self.get_record(ship_id, year)?;
        if amount > record.available_balance {
            return Err(ComplianceError::invalid(format!(
                "insufficient banked balance (available {}, requested {})",
                record.available_balance, amount
            )));
        }

        self.entries
            .append_entry(NewBankEntry::apply(ship_id, year, amount, description))
    }

    pub fn get_record(&self, ship_id: &str, year: i32) -> ComplianceResult<BankRecord> {
        let entries = self.entries.list_entries(ship_id, year)?;
        Ok(BankRecord::from_entries(ship_id, year, entries))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::ComplianceBalance;
    use crate::store::InMemoryStore;

    fn store_with_cb(ship_id: &str, year: i32, cb: f64) -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .upsert_balance(&ComplianceBalance {
                ship_id: ship_id.to_string(),
                year,
                target_intensity: 89.3368,
                actual_intensity: 88.0,
                energy_in_scope: 205_000_000.0,
                compliance_balance: cb,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_empty_record() {
        let store = InMemoryStore::new();
        let ledger = BankLedger::new(&store, &store);

        let record = ledger.get_record("R001", 2025).unwrap();

        assert!(record.is_empty());
        assert_eq!(record.total_banked, 0.0);
        assert_eq!(record.total_applied, 0.0);
        assert_eq!(record.available_balance, 0.0);
    }

    #[test]
    fn test_bank_then_read() {
        let store = store_with_cb("R001", 2025, 274_000_000.0);
        let ledger = BankLedger::new(&store, &store);

        let entry = ledger
            .bank("R001", 2025, 100_000.0, Some("first bank".to_string()))
            .unwrap();

        assert_eq!(entry.entry_type, EntryType::Bank);
        assert_eq!(entry.cb_amount, 100_000.0);

        let record = ledger.get_record("R001", 2025).unwrap();
        assert_eq!(record.total_banked, 100_000.0);
        assert_eq!(record.available_balance, 100_000.0);
        assert_eq!(record.entries.len(), 1);

        // Underlying CB is not decremented
        let cb = store.get_balance("R001", 2025).unwrap().unwrap();
        assert_eq!(cb.compliance_balance, 274_000_000.0);

        println!("✅ Bank then read test PASSED");
    }

    #[test]
    fn test_bank_missing_record_is_not_found() {
        let store = InMemoryStore::new();
        let ledger = BankLedger::new(&store, &store);

        let err = ledger.bank("NOPE", 2025, 1.0, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_bank_rejects_deficit_and_zero_cb() {
        let deficit = store_with_cb("R001", 2025, -327_200_000.0);
        let ledger = BankLedger::new(&deficit, &deficit);
        let err = ledger.bank("R001", 2025, 100_000.0, None).unwrap_err();
        assert!(err.is_invalid_operation());
        assert!(err.to_string().contains("only positive balance may be banked"));

        let zero = store_with_cb("R002", 2025, 0.0);
        let ledger = BankLedger::new(&zero, &zero);
        let err = ledger.bank("R002", 2025, 100_000.0, None).unwrap_err();
        assert!(err.to_string().contains("only positive balance may be banked"));
    }

    #[test]
    fn test_cb_check_wins_over_amount_check() {
        // Both CB and amount are illegal: the CB rule is reported
        let store = store_with_cb("R001", 2025, -5.0);
        let ledger = BankLedger::new(&store, &store);

        let err = ledger.bank("R001", 2025, -1.0, None).unwrap_err();
        assert!(err.to_string().contains("only positive balance"));
    }

    #[test]
    fn test_bank_full_cb_is_legal_but_not_more() {
        let store = store_with_cb("R001", 2025, 1000.0);
        let ledger = BankLedger::new(&store, &store);

        assert!(ledger.bank("R001", 2025, 1000.0 + 1e-9, None).is_err());
        assert!(ledger.bank("R001", 2025, 1000.0, None).is_ok());

        let record = ledger.get_record("R001", 2025).unwrap();
        assert_eq!(record.total_banked, 1000.0);
    }

    #[test]
    fn test_bank_reads_live_cb_not_residual() {
        // Each bank is checked against the full CB, not CB minus banked
        let store = store_with_cb("R001", 2025, 1000.0);
        let ledger = BankLedger::new(&store, &store);

        ledger.bank("R001", 2025, 800.0, None).unwrap();
        ledger.bank("R001", 2025, 800.0, None).unwrap();

        let record = ledger.get_record("R001", 2025).unwrap();
        assert_eq!(record.total_banked, 1600.0);
    }

    #[test]
    fn test_bank_rejects_non_positive_amount() {
        let store = store_with_cb("R001", 2025, 1000.0);
        let ledger = BankLedger::new(&store, &store);

        assert!(ledger.bank("R001", 2025, 0.0, None).is_err());
        assert!(ledger.bank("R001", 2025, -10.0, None).is_err());
        assert!(ledger.bank("R001", 2025, f64::NAN, None).is_err());
        assert!(ledger.get_record("R001", 2025).unwrap().is_empty());
    }

    #[test]
    fn test_apply_exact_balance_then_nothing_left() {
        let store = store_with_cb("R003", 2025, 274_000_000.0);
        let ledger = BankLedger::new(&store, &store);
        ledger.bank("R003", 2025, 100_000.0, None).unwrap();

        assert!(ledger.apply("R003", 2025, 100_001.0, None).is_err());

        let entry = ledger.apply("R003", 2025, 100_000.0, None).unwrap();
        assert_eq!(entry.entry_type, EntryType::Apply);
        assert_eq!(entry.cb_amount, -100_000.0);

        let record = ledger.get_record("R003", 2025).unwrap();
        assert_eq!(record.total_applied, 100_000.0);
        assert_eq!(record.available_balance, 0.0);

        let err = ledger.apply("R003", 2025, 1.0, None).unwrap_err();
        assert!(err.to_string().contains("insufficient banked balance"));

        println!("✅ Apply exact balance test PASSED");
    }

    #[test]
    fn test_apply_in_portions() {
        let store = store_with_cb("R003", 2025, 274_000_000.0);
        let ledger = BankLedger::new(&store, &store);
        ledger.bank("R003", 2025, 100_000.0, None).unwrap();

        ledger.apply("R003", 2025, 50_000.0, None).unwrap();
        ledger.apply("R003", 2025, 50_000.0, None).unwrap();
        assert!(ledger.apply("R003", 2025, 1.0, None).is_err());

        let record = ledger.get_record("R003", 2025).unwrap();
        assert_eq!(record.entries.len(), 3);
        assert_eq!(record.entries[0].entry_type, EntryType::Apply);
        assert_eq!(record.entries[2].entry_type, EntryType::Bank);
    }

    #[test]
    fn test_apply_allowed_against_deficit() {
        let store = store_with_cb("R001", 2025, 500.0);
        let ledger = BankLedger::new(&store, &store);
        ledger.bank("R001", 2025, 500.0, None).unwrap();

        // CB turns into a deficit after recomputation
        store
            .upsert_balance(&ComplianceBalance {
                ship_id: "R001".to_string(),
                year: 2025,
                target_intensity: 89.3368,
                actual_intensity: 91.0,
                energy_in_scope: 205_000_000.0,
                compliance_balance: -327_200_000.0,
            })
            .unwrap();

        assert!(ledger.apply("R001", 2025, 300.0, None).is_ok());
        assert_eq!(
            ledger.get_record("R001", 2025).unwrap().available_balance,
            200.0
        );
    }

    #[test]
    fn test_apply_rejects_non_positive_amount() {
        let store = store_with_cb("R001", 2025, 500.0);
        let ledger = BankLedger::new(&store, &store);
        ledger.bank("R001", 2025, 500.0, None).unwrap();

        assert!(ledger.apply("R001", 2025, 0.0, None).is_err());
        assert!(ledger.apply("R001", 2025, -5.0, None).is_err());
    }

    #[test]
    fn test_record_fold_from_entries() {
        let entries = vec![
            NewBankEntry::bank("R001", 2025, 300.0, None).into_entry(),
            NewBankEntry::bank("R001", 2025, 200.0, None).into_entry(),
            NewBankEntry::apply("R001", 2025, 150.0, None).into_entry(),
        ];

        let record = BankRecord::from_entries("R001", 2025, entries);
        assert_eq!(record.total_banked, 500.0);
        assert_eq!(record.total_applied, 150.0);
        assert_eq!(record.available_balance, 350.0);
    }

    #[test]
    fn test_entry_type_wire_names() {
        assert_eq!(EntryType::Bank.as_str(), "BANK");
        assert_eq!(EntryType::parse("APPLY"), Some(EntryType::Apply));
        assert_eq!(EntryType::parse("apply"), None);
        assert_eq!(
            serde_json::to_string(&EntryType::Apply).unwrap(),
            "\"APPLY\""
        );
    }
}
