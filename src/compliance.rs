// ⚓ Compliance Calculator - GHG intensity → Compliance Balance (CB)
//
// Following the regulatory formula:
//   energy_in_scope    = fuel_consumption × 41,000        (MJ)
//   compliance_balance = (target − actual) × energy_in_scope
//
// Positive CB = surplus (ship did better than target)
// Negative CB = deficit (ship did worse than target)

use crate::error::{ComplianceError, ComplianceResult};
use serde::{Deserialize, Serialize};

/// MJ of energy per tonne of fuel (fixed regulatory constant)
pub const ENERGY_CONVERSION_FACTOR: f64 = 41_000.0;

/// Target GHG intensity for 2025, gCO₂e/MJ
pub const DEFAULT_TARGET_INTENSITY: f64 = 89.3368;

// ============================================================================
// COMPLIANCE BALANCE (one record per ship + year)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceBalance {
    pub ship_id: String,
    pub year: i32,
    pub target_intensity: f64,
    pub actual_intensity: f64,
    /// MJ
    pub energy_in_scope: f64,
    pub compliance_balance: f64,
}

impl ComplianceBalance {
    pub fn is_surplus(&self) -> bool {
        self.compliance_balance > 0.0
    }

    pub fn is_deficit(&self) -> bool {
        self.compliance_balance < 0.0
    }
}

/// Figures produced by the calculator before a ship/year is attached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceFigures {
    pub target_intensity: f64,
    pub actual_intensity: f64,
    pub energy_in_scope: f64,
    pub compliance_balance: f64,
}

impl BalanceFigures {
    /// Attach the key the figures belong to
    pub fn for_ship(self, ship_id: &str, year: i32) -> ComplianceBalance {
        ComplianceBalance {
            ship_id: ship_id.to_string(),
            year,
            target_intensity: self.target_intensity,
            actual_intensity: self.actual_intensity,
            energy_in_scope: self.energy_in_scope,
            compliance_balance: self.compliance_balance,
        }
    }
}

/// Raw inputs for one calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCalculation {
    /// tonnes
    pub fuel_consumption: f64,
    /// gCO₂e/MJ
    pub actual_intensity: f64,
    /// gCO₂e/MJ, calculator default when omitted
    #[serde(default)]
    pub target_intensity: Option<f64>,
}

// ============================================================================
// CALCULATOR
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ComplianceCalculator {
    /// Target applied when a calculation omits one
    pub default_target: f64,
}

impl ComplianceCalculator {
    pub fn new() -> Self {
        ComplianceCalculator {
            default_target: DEFAULT_TARGET_INTENSITY,
        }
    }

    pub fn with_target(default_target: f64) -> Self {
        ComplianceCalculator { default_target }
    }

    pub fn energy_in_scope(&self, fuel_consumption: f64) -> f64 {
        fuel_consumption * ENERGY_CONVERSION_FACTOR
    }

    /// Compute energy in scope and CB.
    ///
    /// Zero fuel yields a zero balance regardless of intensities.
    pub fn compute_balance(
        &self,
        fuel_consumption: f64,
        actual_intensity: f64,
        target_intensity: Option<f64>,
    ) -> ComplianceResult<BalanceFigures> {
        if !fuel_consumption.is_finite() || fuel_consumption < 0.0 {
            return Err(ComplianceError::invalid(format!(
                "fuel consumption must be a non-negative number, got {}",
                fuel_consumption
            )));
        }

        let target_intensity = target_intensity.unwrap_or(self.default_target);
        if !actual_intensity.is_finite() || !target_intensity.is_finite() {
            return Err(ComplianceError::invalid(
                "intensities must be finite numbers",
            ));
        }

        let energy_in_scope = self.energy_in_scope(fuel_consumption);
        let compliance_balance = if energy_in_scope == 0.0 {
            0.0
        } else {
            (target_intensity - actual_intensity) * energy_in_scope
        };

        Ok(BalanceFigures {
            target_intensity,
            actual_intensity,
            energy_in_scope,
            compliance_balance,
        })
    }

    pub fn calculate(&self, calc: &ComplianceCalculation) -> ComplianceResult<BalanceFigures> {
        self.compute_balance(
            calc.fuel_consumption,
            calc.actual_intensity,
            calc.target_intensity,
        )
    }
}

impl Default for ComplianceCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute with the regulatory default target
pub fn compute_balance(
    fuel_consumption: f64,
    actual_intensity: f64,
    target_intensity: Option<f64>,
) -> ComplianceResult<BalanceFigures> {
    ComplianceCalculator::new().compute_balance(fuel_consumption, actual_intensity, target_intensity)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_surplus_example() {
        let figures = compute_balance(5000.0, 88.0, Some(89.3368)).unwrap();

        assert_eq!(figures.energy_in_scope, 205_000_000.0);
        assert!((figures.compliance_balance - 274_044_000.0).abs() < 1.0);
        assert!(figures.compliance_balance > 0.0);

        println!("✅ Surplus example: CB = {:.0}", figures.compliance_balance);
    }

    #[test]
    fn test_deficit_when_actual_above_target() {
        let figures = compute_balance(5000.0, 91.0, None).unwrap();

        assert_eq!(figures.target_intensity, DEFAULT_TARGET_INTENSITY);
        assert!(figures.compliance_balance < 0.0);
        assert!((figures.compliance_balance - (-340_956_000.0)).abs() < 1.0);
    }

    #[test]
    fn test_actual_equals_target_is_zero() {
        let figures = compute_balance(4800.0, 89.3368, None).unwrap();
        assert_eq!(figures.compliance_balance, 0.0);
    }

    #[test]
    fn test_zero_fuel_is_zero_balance() {
        let figures = compute_balance(0.0, 120.0, Some(10.0)).unwrap();

        assert_eq!(figures.energy_in_scope, 0.0);
        assert_eq!(figures.compliance_balance, 0.0);
    }

    #[test]
    fn test_negative_fuel_rejected() {
        let err = compute_balance(-1.0, 88.0, None).unwrap_err();
        assert!(err.is_invalid_operation());

        let err = compute_balance(f64::NAN, 88.0, None).unwrap_err();
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_custom_default_target() {
        let calculator = ComplianceCalculator::with_target(90.0);
        let calc = ComplianceCalculation {
            fuel_consumption: 1.0,
            actual_intensity: 89.0,
            target_intensity: None,
        };

        let figures = calculator.calculate(&calc).unwrap();
        assert_eq!(figures.target_intensity, 90.0);
        assert_eq!(figures.compliance_balance, 41_000.0);
    }

    #[test]
    fn test_for_ship_attaches_key() {
        let balance = compute_balance(100.0, 88.0, None)
            .unwrap()
            .for_ship("R001", 2025);

        assert_eq!(balance.ship_id, "R001");
        assert_eq!(balance.year, 2025);
        assert!(balance.is_surplus());
        assert!(!balance.is_deficit());
    }
}
