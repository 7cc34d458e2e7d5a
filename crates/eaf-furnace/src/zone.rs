//! Furnace zones: physically distinct regions with their own temperature,
//! mass and composition.

use std::fmt;
use std::str::FromStr;

use eaf_core::numeric::{clamp_non_negative, ensure_finite, ensure_non_negative};
use serde::{Deserialize, Serialize};

use crate::composition::Composition;
use crate::error::{FurnaceError, FurnaceResult};

/// Which region of the furnace a zone represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Arc,
    LiquidMetal,
    Slag,
    Refractory,
}

impl ZoneKind {
    pub const ALL: [ZoneKind; 4] = [
        ZoneKind::Arc,
        ZoneKind::LiquidMetal,
        ZoneKind::Slag,
        ZoneKind::Refractory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ZoneKind::Arc => "arc",
            ZoneKind::LiquidMetal => "liquid_metal",
            ZoneKind::Slag => "slag",
            ZoneKind::Refractory => "refractory",
        }
    }

    /// The arc is massless plasma; charge material only lands in the others.
    pub fn accepts_material(self) -> bool {
        !matches!(self, ZoneKind::Arc)
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneKind {
    type Err = FurnaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        ZoneKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| FurnaceError::UnknownZone(s.to_string()))
    }
}

/// One furnace zone.
///
/// Invariants: `temperature_k >= 0`, `mass_kg >= 0`, composition normalized.
/// A zone that loses all of its mass keeps its last composition so the
/// normalization invariant never lapses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub temperature_k: f64,
    pub mass_kg: f64,
    pub composition: Composition,
}

impl Zone {
    pub fn new(
        kind: ZoneKind,
        temperature_k: f64,
        mass_kg: f64,
        composition: Composition,
    ) -> FurnaceResult<Self> {
        let temperature_k = ensure_non_negative(temperature_k, "zone temperature")?;
        let mass_kg = ensure_non_negative(mass_kg, "zone mass")?;
        Ok(Self {
            kind,
            temperature_k,
            mass_kg,
            composition,
        })
    }

    /// Mass of one species in this zone (kg).
    pub fn species_mass_kg(&self, symbol: &str) -> f64 {
        self.composition.fraction(symbol) * self.mass_kg
    }

    /// Merge `mass_kg` of material with `composition` at `temperature_k`.
    ///
    /// Mass adds, composition becomes the mass-weighted average, and the
    /// temperature is the mass-weighted mix of both parts.
    pub fn merge(
        &mut self,
        mass_kg: f64,
        composition: &Composition,
        temperature_k: f64,
    ) -> FurnaceResult<()> {
        if !mass_kg.is_finite() || mass_kg <= 0.0 {
            return Err(FurnaceError::InvalidAmount { value: mass_kg });
        }
        let temperature_k = ensure_non_negative(temperature_k, "injected temperature")?;

        let total = self.mass_kg + mass_kg;
        self.composition = Composition::mix(&self.composition, self.mass_kg, composition, mass_kg);
        self.temperature_k = ensure_finite(
            (self.mass_kg * self.temperature_k + mass_kg * temperature_k) / total,
            "merged temperature",
        )?;
        self.mass_kg = total;
        Ok(())
    }

    /// Add a species at the zone's own temperature.
    pub fn add_species(&mut self, symbol: &str, mass_kg: f64) -> FurnaceResult<()> {
        let temperature = self.temperature_k;
        self.merge(mass_kg, &Composition::pure(symbol), temperature)
    }

    /// Remove up to `mass_kg` of a species. Returns the mass actually removed.
    pub fn remove_species(&mut self, symbol: &str, mass_kg: f64) -> FurnaceResult<f64> {
        let mass_kg = ensure_non_negative(mass_kg, "removed mass")?;
        let mut masses = self.composition.species_masses(self.mass_kg);
        let available = masses.get(symbol).copied().unwrap_or(0.0);
        let removed = mass_kg.min(available);
        if removed <= 0.0 {
            return Ok(0.0);
        }
        if let Some(entry) = masses.get_mut(symbol) {
            *entry = clamp_non_negative(*entry - removed);
        }

        let remaining: f64 = masses.values().sum();
        if let Some(composition) = Composition::from_masses(&masses) {
            self.composition = composition;
        }
        self.mass_kg = clamp_non_negative(remaining);
        Ok(removed)
    }
}

/// The four zones of the furnace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSet {
    pub arc: Zone,
    pub liquid_metal: Zone,
    pub slag: Zone,
    pub refractory: Zone,
}

impl ZoneSet {
    pub fn get(&self, kind: ZoneKind) -> &Zone {
        match kind {
            ZoneKind::Arc => &self.arc,
            ZoneKind::LiquidMetal => &self.liquid_metal,
            ZoneKind::Slag => &self.slag,
            ZoneKind::Refractory => &self.refractory,
        }
    }

    pub fn get_mut(&mut self, kind: ZoneKind) -> &mut Zone {
        match kind {
            ZoneKind::Arc => &mut self.arc,
            ZoneKind::LiquidMetal => &mut self.liquid_metal,
            ZoneKind::Slag => &mut self.slag,
            ZoneKind::Refractory => &mut self.refractory,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        ZoneKind::ALL.into_iter().map(move |kind| self.get(kind))
    }

    pub fn total_mass_kg(&self) -> f64 {
        self.iter().map(|z| z.mass_kg).sum()
    }
}
