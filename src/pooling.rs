// 🤝 Pool Validator - multi-ship CB reallocation under fairness rules
//
// Three rules, all evaluated (never short-circuited):
//   1. Conservation:   Σ adjusted_cb ≥ 0
//   2. Deficit ships:  before < 0  ⇒  after ≥ before
//   3. Surplus ships:  before > 0  ⇒  after ≥ 0
// A member entering at exactly zero is exempt from 2 and 3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMemberRequest {
    pub ship_id: String,
    #[serde(rename = "adjustedCB")]
    pub adjusted_cb: f64,
}

impl PoolMemberRequest {
    pub fn new(ship_id: &str, adjusted_cb: f64) -> Self {
        PoolMemberRequest {
            ship_id: ship_id.to_string(),
            adjusted_cb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolCreationRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub year: i32,
    pub members: Vec<PoolMemberRequest>,
}

// ============================================================================
// VIOLATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum PoolViolation {
    NegativeSum {
        sum: f64,
    },
    DeficitWorsened {
        ship_id: String,
        before: f64,
        after: f64,
    },
    SurplusNegated {
        ship_id: String,
        before: f64,
        after: f64,
    },
}

impl fmt::Display for PoolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolViolation::NegativeSum { sum } => {
                write!(f, "Sum of adjusted CB ({}) must be ≥ 0", sum)
            }
            PoolViolation::DeficitWorsened {
                ship_id,
                before,
                after,
            } => write!(
                f,
                "Ship {}: deficit ship cannot exit worse ({} → {})",
                ship_id, before, after
            ),
            PoolViolation::SurplusNegated {
                ship_id,
                before,
                after,
            } => write!(
                f,
                "Ship {}: surplus ship cannot go negative ({} → {})",
                ship_id, before, after
            ),
        }
    }
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub violations: Vec<PoolViolation>,
    pub cb_before: BTreeMap<String, f64>,
    pub cb_after: BTreeMap<String, f64>,
}

impl PoolValidationResult {
    pub fn sum_after(&self) -> f64 {
        self.cb_after.values().sum()
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct PoolValidator;

impl PoolValidator {
    /// Validate a proposed reallocation against the CB snapshot.
    ///
    /// Pure: the caller looks up `cb_before` for every member. A member
    /// missing from the map counts as entering at zero.
    pub fn validate_pool(
        members: &[PoolMemberRequest],
        cb_before: &BTreeMap<String, f64>,
    ) -> PoolValidationResult {
        let mut violations = Vec::new();
        let mut cb_after = BTreeMap::new();

        let sum: f64 = members.iter().map(|m| m.adjusted_cb).sum();
        // Negated forms so a NaN adjustment counts as a violation
        if !(sum >= 0.0) {
            violations.push(PoolViolation::NegativeSum { sum });
        }

        for member in members {
            let before = cb_before.get(&member.ship_id).copied().unwrap_or(0.0);
            let after = member.adjusted_cb;
            cb_after.insert(member.ship_id.clone(), after);

            if before < 0.0 && !(after >= before) {
                violations.push(PoolViolation::DeficitWorsened {
                    ship_id: member.ship_id.clone(),
                    before,
                    after,
                });
            }

            if before > 0.0 && !(after >= 0.0) {
                violations.push(PoolViolation::SurplusNegated {
                    ship_id: member.ship_id.clone(),
                    before,
                    after,
                });
            }
        }

        PoolValidationResult {
            valid: violations.is_empty(),
            errors: violations.iter().map(|v| v.to_string()).collect(),
            violations,
            cb_before: cb_before.clone(),
            cb_after,
        }
    }
}

pub fn validate_pool(
    members: &[PoolMemberRequest],
    cb_before: &BTreeMap<String, f64>,
) -> PoolValidationResult {
    PoolValidator::validate_pool(members, cb_before)
}

// ============================================================================
// POOL HISTORY (immutable once created)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMember {
    pub id: String,
    pub pool_id: String,
    pub ship_id: String,
    pub cb_before: f64,
    pub cb_after: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPoolMember {
    pub ship_id: String,
    pub cb_before: f64,
    pub cb_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub year: i32,
    pub created_at: DateTime<Utc>,
    pub members: Vec<PoolMember>,
}

impl Pool {
    /// Build a pool with fresh ids, all stamped with the same time
    pub fn assemble(name: Option<&str>, year: i32, members: &[NewPoolMember]) -> Pool {
        let now = Utc::now();
        let pool_id = uuid::Uuid::new_v4().to_string();

        let members = members
            .iter()
            .map(|m| PoolMember {
                id: uuid::Uuid::new_v4().to_string(),
                pool_id: pool_id.clone(),
                ship_id: m.ship_id.clone(),
                cb_before: m.cb_before,
                cb_after: m.cb_after,
                created_at: now,
            })
            .collect();

        Pool {
            id: pool_id,
            name: name.map(|n| n.to_string()),
            year,
            created_at: now,
            members,
        }
    }

    pub fn total_before(&self) -> f64 {
        self.members.iter().map(|m| m.cb_before).sum()
    }

    pub fn total_after(&self) -> f64 {
        self.members.iter().map(|m| m.cb_after).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(ship, cb)| (ship.to_string(), *cb))
            .collect()
    }

    #[test]
    fn test_valid_two_ship_pool() {
        let members = vec![
            PoolMemberRequest::new("R001", 200_000.0),
            PoolMemberRequest::new("R002", -150_000.0),
        ];
        let before = snapshot(&[("R001", 274_000_000.0), ("R002", -327_200_000.0)]);

        let result = validate_pool(&members, &before);

        assert!(result.valid, "errors: {:?}", result.errors);
        assert!(result.errors.is_empty());
        assert_eq!(result.cb_after["R001"], 200_000.0);
        assert_eq!(result.cb_after["R002"], -150_000.0);
        assert_eq!(result.sum_after(), 50_000.0);

        println!("✅ Valid pool test PASSED");
    }

    #[test]
    fn test_deficit_ship_exits_worse() {
        let members = vec![PoolMemberRequest::new("R001", -1500.0)];
        let before = snapshot(&[("R001", -1000.0)]);

        let result = validate_pool(&members, &before);

        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("deficit ship cannot exit worse")));
        assert!(result.errors.iter().any(|e| e.contains("-1000") && e.contains("-1500")));
    }

    #[test]
    fn test_surplus_ship_goes_negative() {
        let members = vec![PoolMemberRequest::new("R001", -500.0)];
        let before = snapshot(&[("R001", 1000.0)]);

        let result = validate_pool(&members, &before);

        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("surplus ship cannot go negative")));
        assert!(result.violations.contains(&PoolViolation::SurplusNegated {
            ship_id: "R001".to_string(),
            before: 1000.0,
            after: -500.0,
        }));
    }

    #[test]
    fn test_negative_sum_names_the_sum() {
        let members = vec![
            PoolMemberRequest::new("R001", 100_000.0),
            PoolMemberRequest::new("R002", -200_000.0),
        ];
        let before = snapshot(&[("R001", 274_000_000.0), ("R002", -327_200_000.0)]);

        let result = validate_pool(&members, &before);

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("-100000"));
    }

    #[test]
    fn test_all_violations_reported() {
        let members = vec![
            PoolMemberRequest::new("R001", -100_000.0),
            PoolMemberRequest::new("R002", -400_000_000.0),
        ];
        let before = snapshot(&[("R001", 274_000_000.0), ("R002", -327_200_000.0)]);

        let result = validate_pool(&members, &before);

        // Sum, surplus negated, deficit worsened
        assert_eq!(result.errors.len(), 3);
        assert!(matches!(result.violations[0], PoolViolation::NegativeSum { .. }));
    }

    #[test]
    fn test_zero_before_is_exempt() {
        let members = vec![
            PoolMemberRequest::new("R001", -50.0),
            PoolMemberRequest::new("R002", 100.0),
        ];
        let before = snapshot(&[("R001", 0.0), ("R002", 150.0)]);

        let result = validate_pool(&members, &before);
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_deficit_may_stay_equal() {
        let members = vec![
            PoolMemberRequest::new("R001", -1000.0),
            PoolMemberRequest::new("R002", 1000.0),
        ];
        let before = snapshot(&[("R001", -1000.0), ("R002", 1000.0)]);

        assert!(validate_pool(&members, &before).valid);
    }

    #[test]
    fn test_missing_snapshot_counts_as_zero() {
        let members = vec![
            PoolMemberRequest::new("GHOST", -10.0),
            PoolMemberRequest::new("R002", 20.0),
        ];
        let before = snapshot(&[("R002", 20.0)]);

        assert!(validate_pool(&members, &before).valid);
    }

    #[test]
    fn test_nan_adjustment_is_invalid() {
        let members = vec![
            PoolMemberRequest::new("R001", f64::NAN),
            PoolMemberRequest::new("R002", f64::NAN),
        ];
        let before = snapshot(&[("R001", -1000.0), ("R002", 1000.0)]);

        let result = validate_pool(&members, &before);

        assert!(!result.valid);
        // Sum, deficit worsened, surplus negated
        assert_eq!(result.errors.len(), 3);
        assert!(matches!(result.violations[0], PoolViolation::NegativeSum { .. }));
    }

    #[test]
    fn test_pool_assemble_shares_id_and_time() {
        let members = vec![
            NewPoolMember {
                ship_id: "R001".to_string(),
                cb_before: 300.0,
                cb_after: 100.0,
            },
            NewPoolMember {
                ship_id: "R002".to_string(),
                cb_before: -200.0,
                cb_after: 0.0,
            },
        ];

        let pool = Pool::assemble(Some("North Sea"), 2025, &members);

        assert_eq!(pool.members.len(), 2);
        assert!(pool.members.iter().all(|m| m.pool_id == pool.id));
        assert!(pool.members.iter().all(|m| m.created_at == pool.created_at));
        assert_eq!(pool.total_before(), 100.0);
        assert_eq!(pool.total_after(), 100.0);
    }

    #[test]
    fn test_request_json_shape() {
        let json = r#"{"year":2025,"members":[{"shipId":"R001","adjustedCB":1.5}]}"#;
        let request: PoolCreationRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.name, None);
        assert_eq!(request.members[0].ship_id, "R001");
        assert_eq!(request.members[0].adjusted_cb, 1.5);
    }
}
