//! Physical coefficients of the furnace model.

use serde::{Deserialize, Serialize};

use crate::error::{FurnaceError, FurnaceResult};
use crate::zone::ZoneKind;

/// Share of arc heat radiated to each material zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArcSplit {
    pub liquid_metal: f64,
    pub slag: f64,
    pub refractory: f64,
}

impl Default for ArcSplit {
    fn default() -> Self {
        Self {
            liquid_metal: 0.7,
            slag: 0.2,
            refractory: 0.1,
        }
    }
}

impl ArcSplit {
    pub fn share(&self, kind: ZoneKind) -> f64 {
        match kind {
            ZoneKind::Arc => 0.0,
            ZoneKind::LiquidMetal => self.liquid_metal,
            ZoneKind::Slag => self.slag,
            ZoneKind::Refractory => self.refractory,
        }
    }
}

/// Specific heat per zone (J/kg·K).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecificHeats {
    pub arc: f64,
    pub liquid_metal: f64,
    pub slag: f64,
    pub refractory: f64,
}

impl Default for SpecificHeats {
    fn default() -> Self {
        Self {
            arc: 1000.0,
            liquid_metal: 800.0,
            slag: 1200.0,
            refractory: 1000.0,
        }
    }
}

impl SpecificHeats {
    pub fn of(&self, kind: ZoneKind) -> f64 {
        match kind {
            ZoneKind::Arc => self.arc,
            ZoneKind::LiquidMetal => self.liquid_metal,
            ZoneKind::Slag => self.slag,
            ZoneKind::Refractory => self.refractory,
        }
    }
}

/// Heat transfer coefficients between adjacent zones (W/K).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Couplings {
    pub metal_slag: f64,
    pub metal_refractory: f64,
    pub slag_refractory: f64,
    /// Refractory shell to ambient.
    pub refractory_ambient: f64,
}

impl Default for Couplings {
    fn default() -> Self {
        Self {
            metal_slag: 5_000.0,
            metal_refractory: 8_000.0,
            slag_refractory: 2_000.0,
            refractory_ambient: 1_500.0,
        }
    }
}

impl Couplings {
    /// Adjacent zone pairs with their coefficient.
    pub fn pairs(&self) -> [(ZoneKind, ZoneKind, f64); 3] {
        [
            (ZoneKind::LiquidMetal, ZoneKind::Slag, self.metal_slag),
            (
                ZoneKind::LiquidMetal,
                ZoneKind::Refractory,
                self.metal_refractory,
            ),
            (ZoneKind::Slag, ZoneKind::Refractory, self.slag_refractory),
        ]
    }
}

/// Oxidation of one bath element by lance oxygen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OxidationReaction {
    /// Element removed from the liquid metal.
    pub element: String,
    /// Oxide species credited to the slag.
    pub product: String,
    /// Reaction does not proceed at or below this bath temperature (K).
    pub ignition_k: f64,
    /// Element oxidized per m³ of oxygen at full activation (kg/m³).
    pub yield_kg_per_m3: f64,
    /// Exothermic heat per kg of element oxidized (J/kg).
    pub heat_j_per_kg: f64,
}

impl OxidationReaction {
    pub fn carbon() -> Self {
        Self {
            element: "C".to_string(),
            product: "CO".to_string(),
            ignition_k: 1200.0,
            yield_kg_per_m3: 1.07,
            heat_j_per_kg: 9.2e6,
        }
    }

    pub fn silicon() -> Self {
        Self {
            element: "Si".to_string(),
            product: "SiO2".to_string(),
            ignition_k: 1400.0,
            yield_kg_per_m3: 1.25,
            heat_j_per_kg: 31.0e6,
        }
    }
}

/// Complete coefficient set for [`crate::physics::step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FurnaceModel {
    /// Electrical-to-thermal conversion in the arc, (0, 1).
    pub arc_efficiency: f64,
    /// Supply limit; requested power above this is clamped (W).
    pub max_power_w: f64,
    pub arc_split: ArcSplit,
    pub specific_heat: SpecificHeats,
    pub couplings: Couplings,
    pub ambient_temperature_k: f64,
    pub reactions: Vec<OxidationReaction>,
    /// Temperature span over which oxidation ramps to full rate (K).
    pub activation_ramp_k: f64,
    /// Ticks in the rolling efficiency window.
    pub efficiency_window: usize,
    /// Anode + cathode voltage drop (V).
    pub arc_voltage_drop_v: f64,
    /// Arc column gradient (V/m).
    pub arc_gradient_v_per_m: f64,
}

impl Default for FurnaceModel {
    fn default() -> Self {
        Self {
            arc_efficiency: 0.9,
            max_power_w: 40.0e6,
            arc_split: ArcSplit::default(),
            specific_heat: SpecificHeats::default(),
            couplings: Couplings::default(),
            ambient_temperature_k: eaf_core::constants::AMBIENT_K,
            reactions: vec![OxidationReaction::carbon(), OxidationReaction::silicon()],
            activation_ramp_k: 200.0,
            efficiency_window: 60,
            arc_voltage_drop_v: 40.0,
            arc_gradient_v_per_m: 1000.0,
        }
    }
}

impl FurnaceModel {
    pub fn validate(&self) -> FurnaceResult<()> {
        if !(self.arc_efficiency > 0.0 && self.arc_efficiency < 1.0) {
            return Err(FurnaceError::InvalidArg {
                what: "arc_efficiency must be in (0, 1)",
            });
        }
        if !(self.max_power_w.is_finite() && self.max_power_w > 0.0) {
            return Err(FurnaceError::InvalidArg {
                what: "max_power_w must be positive",
            });
        }
        let split = self.arc_split;
        let shares = [split.liquid_metal, split.slag, split.refractory];
        if shares.iter().any(|s| !s.is_finite() || *s < 0.0)
            || (shares.iter().sum::<f64>() - 1.0).abs() > 1e-9
        {
            return Err(FurnaceError::InvalidArg {
                what: "arc_split shares must be non-negative and sum to 1",
            });
        }
        if ZoneKind::ALL
            .into_iter()
            .any(|kind| !(self.specific_heat.of(kind) > 0.0))
        {
            return Err(FurnaceError::InvalidArg {
                what: "specific heats must be positive",
            });
        }
        let c = self.couplings;
        if [
            c.metal_slag,
            c.metal_refractory,
            c.slag_refractory,
            c.refractory_ambient,
        ]
        .iter()
        .any(|h| !h.is_finite() || *h < 0.0)
        {
            return Err(FurnaceError::InvalidArg {
                what: "couplings must be non-negative",
            });
        }
        if !(self.ambient_temperature_k.is_finite() && self.ambient_temperature_k >= 0.0) {
            return Err(FurnaceError::InvalidArg {
                what: "ambient_temperature_k must be non-negative",
            });
        }
        if self.reactions.iter().any(|r| {
            !(r.ignition_k >= 0.0 && r.yield_kg_per_m3 >= 0.0 && r.heat_j_per_kg >= 0.0)
        }) {
            return Err(FurnaceError::InvalidArg {
                what: "reaction coefficients must be non-negative",
            });
        }
        if !(self.activation_ramp_k > 0.0) {
            return Err(FurnaceError::InvalidArg {
                what: "activation_ramp_k must be positive",
            });
        }
        if self.efficiency_window == 0 {
            return Err(FurnaceError::InvalidArg {
                what: "efficiency_window must be at least 1",
            });
        }
        if !(self.arc_gradient_v_per_m > 0.0) {
            return Err(FurnaceError::InvalidArg {
                what: "arc_gradient_v_per_m must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_valid() {
        FurnaceModel::default().validate().unwrap();
    }

    #[test]
    fn split_must_sum_to_one() {
        let model = FurnaceModel {
            arc_split: ArcSplit {
                liquid_metal: 0.7,
                slag: 0.2,
                refractory: 0.2,
            },
            ..Default::default()
        };
        assert!(model.validate().is_err());
    }

    #[test]
    fn arc_efficiency_must_be_below_one() {
        let model = FurnaceModel {
            arc_efficiency: 1.0,
            ..Default::default()
        };
        assert!(model.validate().is_err());
    }
}
