//! Zone composition as normalized mass fractions.

use std::collections::BTreeMap;

use eaf_core::numeric::{Tolerances, nearly_equal};
use serde::{Deserialize, Serialize};

use crate::error::{FurnaceError, FurnaceResult};

/// Species below this fraction are dropped after normalization.
const NEGLIGIBLE_FRACTION: f64 = 1e-15;

/// Material composition keyed by species symbol (`"Fe"`, `"C"`, `"SiO2"`, ...).
///
/// Always normalized: fractions are non-negative and sum to 1. Species are
/// kept in a `BTreeMap` so iteration order (and therefore every derived
/// float sum) is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct Composition {
    fractions: BTreeMap<String, f64>,
}

impl Composition {
    /// Single-species composition.
    pub fn pure(symbol: impl Into<String>) -> Self {
        let mut fractions = BTreeMap::new();
        fractions.insert(symbol.into(), 1.0);
        Self { fractions }
    }

    /// Create a composition from mass fractions (or any non-negative weights).
    ///
    /// Validates that all entries are finite, non-negative, and have a positive
    /// sum, then normalizes to sum=1. Repeated symbols are accumulated.
    pub fn from_mass_fractions<I, S>(fractions: I) -> FurnaceResult<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        for (symbol, frac) in fractions {
            if !frac.is_finite() {
                return Err(FurnaceError::NonPhysical {
                    what: "non-finite mass fraction",
                });
            }
            if frac < 0.0 {
                return Err(FurnaceError::NonPhysical {
                    what: "negative mass fraction",
                });
            }
            *weights.entry(symbol.into()).or_insert(0.0) += frac;
        }
        Self::normalized(weights).ok_or(FurnaceError::NonPhysical {
            what: "mass fractions sum to zero",
        })
    }

    /// Build from absolute species masses (kg). Returns `None` when the total is zero.
    pub fn from_masses(masses: &BTreeMap<String, f64>) -> Option<Self> {
        Self::normalized(
            masses
                .iter()
                .map(|(s, m)| (s.clone(), m.max(0.0)))
                .collect(),
        )
    }

    fn normalized(weights: BTreeMap<String, f64>) -> Option<Self> {
        let sum: f64 = weights.values().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return None;
        }
        let fractions: BTreeMap<String, f64> = weights
            .into_iter()
            .map(|(s, w)| (s, w / sum))
            .filter(|(_, f)| *f > NEGLIGIBLE_FRACTION)
            .collect();
        if fractions.is_empty() {
            return None;
        }
        // Second pass absorbs the mass dropped with negligible species.
        let sum: f64 = fractions.values().sum();
        Some(Self {
            fractions: fractions.into_iter().map(|(s, f)| (s, f / sum)).collect(),
        })
    }

    /// Mass-weighted average of two compositions.
    ///
    /// `mass_a` and `mass_b` are the masses carrying each composition. If both
    /// are zero the result is `b`.
    pub fn mix(a: &Composition, mass_a: f64, b: &Composition, mass_b: f64) -> Composition {
        let mut masses = a.species_masses(mass_a.max(0.0));
        for (symbol, kg) in b.species_masses(mass_b.max(0.0)) {
            *masses.entry(symbol).or_insert(0.0) += kg;
        }
        Self::from_masses(&masses).unwrap_or_else(|| b.clone())
    }

    /// Mass fraction of a species (0.0 if absent).
    pub fn fraction(&self, symbol: &str) -> f64 {
        self.fractions.get(symbol).copied().unwrap_or(0.0)
    }

    /// Split a total mass into per-species masses.
    pub fn species_masses(&self, total_kg: f64) -> BTreeMap<String, f64> {
        self.fractions
            .iter()
            .map(|(s, f)| (s.clone(), f * total_kg))
            .collect()
    }

    /// Iterate over `(symbol, fraction)` pairs in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.fractions.iter().map(|(s, f)| (s.as_str(), *f))
    }

    pub fn len(&self) -> usize {
        self.fractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fractions.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.fractions.values().sum()
    }

    /// True when fractions sum to 1 within [`Tolerances::FRACTION`].
    pub fn is_normalized(&self) -> bool {
        nearly_equal(self.sum(), 1.0, Tolerances::FRACTION)
            && self.fractions.values().all(|f| *f >= 0.0)
    }
}

impl TryFrom<BTreeMap<String, f64>> for Composition {
    type Error = FurnaceError;

    fn try_from(value: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Composition::from_mass_fractions(value)
    }
}

impl From<Composition> for BTreeMap<String, f64> {
    fn from(value: Composition) -> Self {
        value.fractions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tol() -> Tolerances {
        Tolerances {
            abs: 1e-10,
            rel: 1e-10,
        }
    }

    #[test]
    fn pure_composition() {
        let comp = Composition::pure("Fe");
        assert_eq!(comp.fraction("Fe"), 1.0);
        assert_eq!(comp.fraction("C"), 0.0);
        assert_eq!(comp.len(), 1);
    }

    #[test]
    fn normalization_non_unit_sum() {
        let comp = Composition::from_mass_fractions([("Fe", 9.0), ("C", 1.0)]).unwrap();
        assert!(nearly_equal(comp.fraction("Fe"), 0.9, tol()));
        assert!(nearly_equal(comp.fraction("C"), 0.1, tol()));
    }

    #[test]
    fn duplicate_symbols_accumulate() {
        let comp = Composition::from_mass_fractions([("C", 0.5), ("C", 0.5), ("Fe", 1.0)]).unwrap();
        assert!(nearly_equal(comp.fraction("C"), 0.5, tol()));
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(Composition::from_mass_fractions([("Fe", -0.5), ("C", 1.5)]).is_err());
        assert!(Composition::from_mass_fractions([("Fe", 0.0), ("C", 0.0)]).is_err());
        assert!(Composition::from_mass_fractions([("Fe", f64::NAN)]).is_err());
        assert!(Composition::from_mass_fractions(Vec::<(String, f64)>::new()).is_err());
    }

    #[test]
    fn mix_is_mass_weighted() {
        let metal = Composition::from_mass_fractions([("Fe", 0.95), ("C", 0.05)]).unwrap();
        let scrap = Composition::from_mass_fractions([("Fe", 0.98), ("C", 0.02)]).unwrap();
        let mixed = Composition::mix(&metal, 3000.0, &scrap, 1000.0);
        // C: (150 + 20) / 4000
        assert!(nearly_equal(mixed.fraction("C"), 170.0 / 4000.0, tol()));
        assert!(mixed.is_normalized());
    }

    #[test]
    fn mix_into_empty_takes_injected() {
        let slag = Composition::pure("CaO");
        let lime = Composition::pure("CaO");
        let mixed = Composition::mix(&slag, 0.0, &lime, 10.0);
        assert_eq!(mixed, lime);
    }

    #[test]
    fn serde_round_trip_renormalizes() {
        let json = r#"{"Fe": 2.0, "C": 2.0}"#;
        let comp: Composition = serde_json::from_str(json).unwrap();
        assert!(nearly_equal(comp.fraction("Fe"), 0.5, tol()));
    }
}
