// 🛳️ Routes - voyage data + baseline comparison
//
// A route carries the raw figures a CB is computed from. Its route_id
// doubles as the ship id for compliance records.
//
// Comparison against the baseline:
//   percent_diff = ((comparison / baseline) − 1) × 100
//   compliant    = comparison ≤ baseline

use crate::compliance::{ComplianceBalance, ComplianceCalculator};
use crate::error::ComplianceResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ROUTE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub route_id: String,
    pub vessel_type: String,
    pub fuel_type: String,
    pub year: i32,
    /// gCO₂e/MJ
    pub ghg_intensity: f64,
    /// tonnes
    pub fuel_consumption: f64,
    /// km
    pub distance: f64,
    /// tonnes
    pub total_emissions: f64,
    pub is_baseline: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        route_id: &str,
        vessel_type: &str,
        fuel_type: &str,
        year: i32,
        ghg_intensity: f64,
        fuel_consumption: f64,
        distance: f64,
        total_emissions: f64,
    ) -> Self {
        let now = Utc::now();

        Route {
            id: uuid::Uuid::new_v4().to_string(),
            route_id: route_id.to_string(),
            vessel_type: vessel_type.to_string(),
            fuel_type: fuel_type.to_string(),
            year,
            ghg_intensity,
            fuel_consumption,
            distance,
            total_emissions,
            is_baseline: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// CB for the ship sailing this route (route_id = ship id)
    pub fn compliance_balance(
        &self,
        calculator: &ComplianceCalculator,
    ) -> ComplianceResult<ComplianceBalance> {
        let figures =
            calculator.compute_balance(self.fuel_consumption, self.ghg_intensity, None)?;
        Ok(figures.for_ship(&self.route_id, self.year))
    }
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteFilter {
    pub vessel_type: Option<String>,
    pub fuel_type: Option<String>,
    pub year: Option<i32>,
}

impl RouteFilter {
    pub fn matches(&self, route: &Route) -> bool {
        self.vessel_type
            .as_ref()
            .map_or(true, |v| &route.vessel_type == v)
            && self.fuel_type.as_ref().map_or(true, |f| &route.fuel_type == f)
            && self.year.map_or(true, |y| route.year == y)
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteComparison {
    pub route_id: String,
    pub vessel_type: String,
    pub fuel_type: String,
    pub year: i32,
    pub baseline: f64,
    pub comparison: f64,
    pub percent_diff: f64,
    pub compliant: bool,
}

pub fn percent_diff(baseline: f64, comparison: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    ((comparison / baseline) - 1.0) * 100.0
}

pub fn is_compliant(baseline: f64, comparison: f64) -> bool {
    comparison <= baseline
}

/// Compare every route except the baseline itself
pub fn compare_routes(baseline: &Route, routes: &[Route]) -> Vec<RouteComparison> {
    routes
        .iter()
        .filter(|route| route.id != baseline.id)
        .map(|route| RouteComparison {
            route_id: route.route_id.clone(),
            vessel_type: route.vessel_type.clone(),
            fuel_type: route.fuel_type.clone(),
            year: route.year,
            baseline: baseline.ghg_intensity,
            comparison: route.ghg_intensity,
            percent_diff: percent_diff(baseline.ghg_intensity, route.ghg_intensity),
            compliant: is_compliant(baseline.ghg_intensity, route.ghg_intensity),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(route_id: &str, vessel: &str, fuel: &str, year: i32, intensity: f64) -> Route {
        Route::new(route_id, vessel, fuel, year, intensity, 5000.0, 12000.0, 4500.0)
    }

    #[test]
    fn test_percent_diff() {
        assert!((percent_diff(91.0, 88.0) - (-3.2967)).abs() < 0.001);
        assert!((percent_diff(88.0, 91.0) - 3.4090).abs() < 0.001);
        assert_eq!(percent_diff(0.0, 91.0), 0.0);
        assert_eq!(percent_diff(91.0, 91.0), 0.0);
    }

    #[test]
    fn test_is_compliant() {
        assert!(is_compliant(91.0, 88.0));
        assert!(is_compliant(91.0, 91.0));
        assert!(!is_compliant(88.0, 91.0));
    }

    #[test]
    fn test_compare_routes_skips_baseline() {
        let baseline = route("R001", "Container", "HFO", 2024, 91.0);
        let routes = vec![
            baseline.clone(),
            route("R002", "BulkCarrier", "LNG", 2024, 88.0),
            route("R003", "Tanker", "MGO", 2024, 93.5),
        ];

        let comparisons = compare_routes(&baseline, &routes);

        assert_eq!(comparisons.len(), 2);
        assert_eq!(comparisons[0].route_id, "R002");
        assert!(comparisons[0].compliant);
        assert_eq!(comparisons[0].baseline, 91.0);
        assert!(!comparisons[1].compliant);
        assert!(comparisons[1].percent_diff > 0.0);

        println!("✅ Route comparison test PASSED");
    }

    #[test]
    fn test_filter_matches() {
        let r = route("R002", "BulkCarrier", "LNG", 2024, 88.0);

        assert!(RouteFilter::default().matches(&r));
        assert!(RouteFilter {
            vessel_type: Some("BulkCarrier".to_string()),
            ..Default::default()
        }
        .matches(&r));
        assert!(!RouteFilter {
            fuel_type: Some("HFO".to_string()),
            ..Default::default()
        }
        .matches(&r));
        assert!(!RouteFilter {
            year: Some(2025),
            ..Default::default()
        }
        .matches(&r));
    }

    #[test]
    fn test_route_compliance_balance() {
        let r = route("R002", "BulkCarrier", "LNG", 2024, 88.0);
        let cb = r.compliance_balance(&ComplianceCalculator::new()).unwrap();

        assert_eq!(cb.ship_id, "R002");
        assert_eq!(cb.year, 2024);
        assert_eq!(cb.energy_in_scope, 205_000_000.0);
        assert!(cb.compliance_balance > 0.0);
    }
}
