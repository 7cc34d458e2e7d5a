//! Alert thresholds evaluated once per tick.
//!
//! A breach is data carried on the snapshot, never an error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[default]
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OverTemperature,
    UnderTemperature,
    OverPower,
    LowCarbon,
}

impl AlertKind {
    pub fn severity(self) -> AlertSeverity {
        match self {
            AlertKind::OverTemperature => AlertSeverity::Critical,
            AlertKind::UnderTemperature | AlertKind::OverPower | AlertKind::LowCarbon => {
                AlertSeverity::Warning
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub value: f64,
    pub limit: f64,
    pub severity: AlertSeverity,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertReport {
    pub severity: AlertSeverity,
    pub breaches: Vec<Alert>,
}

impl AlertReport {
    pub fn is_breached(&self) -> bool {
        !self.breaches.is_empty()
    }

    pub fn has(&self, kind: AlertKind) -> bool {
        self.breaches.iter().any(|a| a.kind == kind)
    }

    fn push(&mut self, kind: AlertKind, value: f64, limit: f64) {
        let severity = kind.severity();
        self.severity = self.severity.max(severity);
        self.breaches.push(Alert {
            kind,
            value,
            limit,
            severity,
        });
    }
}

/// Limits on the liquid metal and the arc supply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertThresholds {
    pub max_temperature_k: f64,
    pub min_temperature_k: f64,
    pub max_power_w: f64,
    pub min_carbon_fraction: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_temperature_k: 2000.0,
            min_temperature_k: 298.0,
            max_power_w: 25.0e6,
            min_carbon_fraction: 0.01,
        }
    }
}

impl AlertThresholds {
    /// Evaluate liquid-metal temperature, requested arc power and carbon content.
    ///
    /// The carbon check is skipped for an empty bath.
    pub fn evaluate(
        &self,
        metal_temperature_k: f64,
        metal_mass_kg: f64,
        carbon_fraction: f64,
        requested_power_w: f64,
    ) -> AlertReport {
        let mut report = AlertReport::default();
        if metal_temperature_k > self.max_temperature_k {
            report.push(
                AlertKind::OverTemperature,
                metal_temperature_k,
                self.max_temperature_k,
            );
        }
        if metal_temperature_k < self.min_temperature_k {
            report.push(
                AlertKind::UnderTemperature,
                metal_temperature_k,
                self.min_temperature_k,
            );
        }
        if requested_power_w > self.max_power_w {
            report.push(AlertKind::OverPower, requested_power_w, self.max_power_w);
        }
        if metal_mass_kg > 0.0 && carbon_fraction < self.min_carbon_fraction {
            report.push(
                AlertKind::LowCarbon,
                carbon_fraction,
                self.min_carbon_fraction,
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominal_conditions_raise_nothing() {
        let report = AlertThresholds::default().evaluate(1800.0, 150_000.0, 0.04, 16.0e6);
        assert!(!report.is_breached());
        assert_eq!(report.severity, AlertSeverity::Normal);
    }

    #[test]
    fn severity_is_the_worst_breach() {
        let report = AlertThresholds::default().evaluate(2100.0, 150_000.0, 0.001, 30.0e6);
        assert!(report.has(AlertKind::OverTemperature));
        assert!(report.has(AlertKind::OverPower));
        assert!(report.has(AlertKind::LowCarbon));
        assert_eq!(report.severity, AlertSeverity::Critical);
    }

    #[test]
    fn empty_bath_skips_carbon_check() {
        let report = AlertThresholds::default().evaluate(1800.0, 0.0, 0.0, 1.0);
        assert!(!report.has(AlertKind::LowCarbon));
    }
}
