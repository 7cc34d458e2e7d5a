//! Material ledger: pending injections and running totals of applied material.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{FurnaceError, FurnaceResult};
use crate::params::OperatingParameters;
use crate::zone::ZoneKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionSource {
    /// Explicit `add_material` request.
    Operator,
    /// Continuous feed derived from operating parameters.
    Feed,
}

/// One batch of material waiting for the next tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialInjection {
    pub material: String,
    pub mass_kg: f64,
    pub zone: ZoneKind,
    pub requested_at_tick: u64,
    pub source: InjectionSource,
}

impl MaterialInjection {
    /// Validated operator request.
    pub fn new(
        material: impl Into<String>,
        mass_kg: f64,
        zone: ZoneKind,
        requested_at_tick: u64,
    ) -> FurnaceResult<Self> {
        let material = material.into();
        if material.trim().is_empty() {
            return Err(FurnaceError::InvalidArg {
                what: "material name must not be empty",
            });
        }
        if !mass_kg.is_finite() || mass_kg <= 0.0 {
            return Err(FurnaceError::InvalidAmount { value: mass_kg });
        }
        if !zone.accepts_material() {
            return Err(FurnaceError::ZoneRejectsMaterial(zone));
        }
        Ok(Self {
            material,
            mass_kg,
            zone,
            requested_at_tick,
            source: InjectionSource::Operator,
        })
    }

    fn feed(material: &str, mass_kg: f64, zone: ZoneKind, tick: u64) -> Self {
        Self {
            material: material.to_string(),
            mass_kg,
            zone,
            requested_at_tick: tick,
            source: InjectionSource::Feed,
        }
    }
}

/// Injections implied by the continuous feed rates over one tick.
///
/// Carbon goes to the bath; lime and dolomite go to the slag. Zero rates
/// produce nothing.
pub fn feed_injections(params: &OperatingParameters, dt: f64, tick: u64) -> Vec<MaterialInjection> {
    [
        ("carbon", params.carbon_injection_rate, ZoneKind::LiquidMetal),
        ("lime", params.lime_addition_rate, ZoneKind::Slag),
        ("dolomite", params.dolomite_addition_rate, ZoneKind::Slag),
    ]
    .into_iter()
    .filter(|(_, rate, _)| *rate > 0.0)
    .map(|(material, rate, zone)| MaterialInjection::feed(material, rate * dt, zone, tick))
    .collect()
}

/// Queue of pending injections plus cumulative applied mass per material.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialLedger {
    pending: VecDeque<MaterialInjection>,
    applied_kg: BTreeMap<String, f64>,
    applied_count: u64,
}

impl MaterialLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&mut self, injection: MaterialInjection) {
        self.pending.push_back(injection);
    }

    pub fn pending(&self) -> impl Iterator<Item = &MaterialInjection> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Remove everything queued, in arrival order.
    pub fn take_pending(&mut self) -> Vec<MaterialInjection> {
        self.pending.drain(..).collect()
    }

    /// Record injections that were merged into the zones.
    pub fn record_applied(&mut self, applied: &[MaterialInjection]) {
        for injection in applied {
            *self
                .applied_kg
                .entry(injection.material.clone())
                .or_insert(0.0) += injection.mass_kg;
            self.applied_count += 1;
        }
    }

    pub fn applied_totals(&self) -> &BTreeMap<String, f64> {
        &self.applied_kg
    }

    pub fn applied_count(&self) -> u64 {
        self.applied_count
    }

    pub fn total_applied_kg(&self) -> f64 {
        self.applied_kg.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_validates_amount_and_zone() {
        assert_eq!(
            MaterialInjection::new("lime", 0.0, ZoneKind::Slag, 0),
            Err(FurnaceError::InvalidAmount { value: 0.0 })
        );
        assert_eq!(
            MaterialInjection::new("lime", 10.0, ZoneKind::Arc, 0),
            Err(FurnaceError::ZoneRejectsMaterial(ZoneKind::Arc))
        );
        assert!(MaterialInjection::new("  ", 10.0, ZoneKind::Slag, 0).is_err());
        assert!(MaterialInjection::new("lime", 10.0, ZoneKind::Slag, 3).is_ok());
    }

    #[test]
    fn feeds_follow_rates() {
        let params = OperatingParameters {
            carbon_injection_rate: 0.1,
            lime_addition_rate: 0.0,
            dolomite_addition_rate: 0.03,
            ..Default::default()
        };
        let feeds = feed_injections(&params, 2.0, 7);
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].material, "carbon");
        assert_eq!(feeds[0].zone, ZoneKind::LiquidMetal);
        assert!((feeds[0].mass_kg - 0.2).abs() < 1e-12);
        assert_eq!(feeds[1].zone, ZoneKind::Slag);
        assert!(feeds.iter().all(|f| f.source == InjectionSource::Feed));
    }

    #[test]
    fn ledger_keeps_order_and_totals() {
        let mut ledger = MaterialLedger::new();
        ledger.queue(MaterialInjection::new("steel_scrap", 1000.0, ZoneKind::LiquidMetal, 1).unwrap());
        ledger.queue(MaterialInjection::new("lime", 50.0, ZoneKind::Slag, 1).unwrap());
        ledger.queue(MaterialInjection::new("steel_scrap", 500.0, ZoneKind::LiquidMetal, 2).unwrap());
        assert_eq!(ledger.pending_len(), 3);

        let taken = ledger.take_pending();
        assert_eq!(ledger.pending_len(), 0);
        assert_eq!(taken[1].material, "lime");

        ledger.record_applied(&taken);
        assert_eq!(ledger.applied_totals()["steel_scrap"], 1500.0);
        assert_eq!(ledger.applied_count(), 3);
        assert_eq!(ledger.total_applied_kg(), 1550.0);
    }
}
