//! The per-tick physics step.
//!
//! [`step`] is a pure function: it takes the current [`FurnaceState`] by
//! reference and returns a fresh, independent state. Order within a tick:
//!
//! 1. electrical power (`V × I × pf`, clamped to the supply limit)
//! 2. heat transfer (arc heat routed to material zones, pairwise flux, ambient loss)
//! 3. temperature update (`ΔT = E / (m·cp)`, massless zones hold temperature),
//!    sub-stepped when `dt` is long against a zone's exchange time constant
//! 4. oxidation of bath elements by lance oxygen
//! 5. material injections merged into their target zones
//! 6. derived metrics (cumulative energy, rolling efficiency)
//!
//! Reaction heat lags by one tick: heat released in step 4 of tick `n` is
//! stored in [`FurnaceState::pending_reaction_heat_j`] and enters the energy
//! balance in step 2 of tick `n + 1`.

use std::collections::VecDeque;

use eaf_core::numeric::{clamp_non_negative, ensure_finite};
use eaf_core::units::constants::KG_PER_TONNE;

use crate::composition::Composition;
use crate::error::{FurnaceError, FurnaceResult, PhysicsError, PhysicsResult};
use crate::ledger::MaterialInjection;
use crate::materials::composition_for;
use crate::model::FurnaceModel;
use crate::params::OperatingParameters;
use crate::zone::{Zone, ZoneKind, ZoneSet};

/// Initial arc plasma temperature (K).
const ARC_TEMPERATURE_K: f64 = 5000.0;
const INITIAL_SLAG_KG: f64 = 50.0;
const REFRACTORY_KG: f64 = 1000.0;

/// Rolling window of (useful heat, electrical input) pairs in J.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyWindow {
    capacity: usize,
    samples: VecDeque<(f64, f64)>,
}

impl EfficiencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, useful_j: f64, input_j: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((useful_j, input_j));
    }

    /// Useful heat over electrical input across the window, in percent.
    pub fn percent(&self) -> f64 {
        let (useful, input) = self
            .samples
            .iter()
            .fold((0.0, 0.0), |(u, i), (du, di)| (u + du, i + di));
        if input > 0.0 {
            100.0 * useful / input
        } else {
            0.0
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Physical state advanced by [`step`].
#[derive(Debug, Clone, PartialEq)]
pub struct FurnaceState {
    pub tick: u64,
    pub time_s: f64,
    pub zones: ZoneSet,
    /// Delivered electrical power of the last step (W).
    pub current_power_w: f64,
    pub cumulative_energy_j: f64,
    /// Reaction heat released last tick, applied on the next one.
    pub pending_reaction_heat_j: f64,
    pub efficiency: EfficiencyWindow,
}

impl FurnaceState {
    /// Freshly charged furnace: `capacity_t` tonnes of bath at `initial_temperature_k`.
    pub fn new(
        capacity_t: f64,
        initial_temperature_k: f64,
        model: &FurnaceModel,
    ) -> FurnaceResult<Self> {
        if !capacity_t.is_finite() || capacity_t <= 0.0 {
            return Err(FurnaceError::InvalidArg {
                what: "furnace capacity must be positive",
            });
        }
        let zones = ZoneSet {
            arc: Zone::new(
                ZoneKind::Arc,
                ARC_TEMPERATURE_K,
                0.0,
                Composition::pure("N2"),
            )?,
            liquid_metal: Zone::new(
                ZoneKind::LiquidMetal,
                initial_temperature_k,
                capacity_t * KG_PER_TONNE,
                Composition::from_mass_fractions([("Fe", 0.95), ("C", 0.04), ("Si", 0.01)])?,
            )?,
            slag: Zone::new(
                ZoneKind::Slag,
                initial_temperature_k,
                INITIAL_SLAG_KG,
                Composition::from_mass_fractions([
                    ("CaO", 0.4),
                    ("SiO2", 0.3),
                    ("FeO", 0.2),
                    ("MgO", 0.1),
                ])?,
            )?,
            refractory: Zone::new(
                ZoneKind::Refractory,
                initial_temperature_k,
                REFRACTORY_KG,
                Composition::from_mass_fractions([("MgO", 0.9), ("C", 0.1)])?,
            )?,
        };
        Ok(Self {
            tick: 0,
            time_s: 0.0,
            zones,
            current_power_w: 0.0,
            cumulative_energy_j: 0.0,
            pending_reaction_heat_j: 0.0,
            efficiency: EfficiencyWindow::new(model.efficiency_window),
        })
    }

    pub fn efficiency_percent(&self) -> f64 {
        self.efficiency.percent()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    /// `V × I × pf` before the supply clamp (W).
    pub requested_w: f64,
    /// Power actually delivered (W).
    pub delivered_w: f64,
    pub clamped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionOutcome {
    pub element: String,
    pub product: String,
    pub consumed_kg: f64,
    pub heat_j: f64,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub state: FurnaceState,
    pub power: PowerReading,
    pub reactions: Vec<ReactionOutcome>,
    /// Sensible heat absorbed by the liquid metal this tick (J, ≥ 0).
    pub useful_heat_j: f64,
    pub injected_kg: f64,
}

/// Arc column length from the arc voltage: `(V − drop) / gradient`, never negative.
pub fn arc_length_m(params: &OperatingParameters, model: &FurnaceModel) -> f64 {
    clamp_non_negative((params.arc_voltage - model.arc_voltage_drop_v) / model.arc_gradient_v_per_m)
}

fn slot(kind: ZoneKind) -> usize {
    match kind {
        ZoneKind::Arc => 0,
        ZoneKind::LiquidMetal => 1,
        ZoneKind::Slag => 2,
        ZoneKind::Refractory => 3,
    }
}

const MATERIAL_ZONES: [ZoneKind; 3] = [ZoneKind::LiquidMetal, ZoneKind::Slag, ZoneKind::Refractory];

/// Upper bound on exchange sub-steps within one tick.
const MAX_EXCHANGE_SUBSTEPS: f64 = 100_000.0;

/// Heat capacity `m·cp` per zone slot (J/K); zero for massless zones.
fn heat_capacities(zones: &ZoneSet, model: &FurnaceModel) -> [f64; 4] {
    let mut capacity = [0.0_f64; 4];
    for kind in MATERIAL_ZONES {
        let zone = zones.get(kind);
        if zone.mass_kg > 0.0 {
            capacity[slot(kind)] = zone.mass_kg * model.specific_heat.of(kind);
        }
    }
    capacity
}

/// Sub-steps needed so that every explicit exchange update stays a convex
/// mix of the zone's own and its neighbours' temperatures.
fn exchange_substeps(capacity: &[f64; 4], model: &FurnaceModel, dt: f64) -> PhysicsResult<u64> {
    let mut conductance = [0.0_f64; 4];
    for (a, b, h) in model.couplings.pairs() {
        if capacity[slot(a)] > 0.0 && capacity[slot(b)] > 0.0 {
            conductance[slot(a)] += h;
            conductance[slot(b)] += h;
        }
    }
    let refractory = slot(ZoneKind::Refractory);
    if capacity[refractory] > 0.0 {
        conductance[refractory] += model.couplings.refractory_ambient;
    }
    let time_constant_s = capacity
        .iter()
        .zip(conductance)
        .filter(|(c, g)| **c > 0.0 && *g > 0.0)
        .map(|(c, g)| c / g)
        .fold(f64::INFINITY, f64::min);

    let substeps = (dt / (0.5 * time_constant_s)).ceil().max(1.0);
    if !(substeps <= MAX_EXCHANGE_SUBSTEPS) {
        return Err(PhysicsError::NonPhysical {
            what: format!(
                "time step of {dt} s exceeds {MAX_EXCHANGE_SUBSTEPS} exchange sub-steps \
                 (shortest zone time constant {time_constant_s:.3e} s)"
            ),
        });
    }
    Ok(substeps as u64)
}

/// Pairwise and ambient exchange over `dt` with `source_j` spread evenly
/// across the sub-steps. Returns the new temperature per zone slot.
fn exchange_heat(
    zones: &ZoneSet,
    source_j: &[f64; 4],
    model: &FurnaceModel,
    dt: f64,
) -> PhysicsResult<[f64; 4]> {
    let capacity = heat_capacities(zones, model);
    let substeps = exchange_substeps(&capacity, model, dt)?;
    let h = dt / substeps as f64;
    let share = h / dt;

    let mut t = ZoneKind::ALL.map(|kind| zones.get(kind).temperature_k);
    for _ in 0..substeps {
        let mut energy = [0.0_f64; 4];
        for kind in MATERIAL_ZONES {
            energy[slot(kind)] = source_j[slot(kind)] * share;
        }
        for (a, b, coupling) in model.couplings.pairs() {
            let (ia, ib) = (slot(a), slot(b));
            if capacity[ia] <= 0.0 || capacity[ib] <= 0.0 {
                continue;
            }
            let q = coupling * (t[ia] - t[ib]) * h;
            energy[ia] -= q;
            energy[ib] += q;
        }
        let refractory = slot(ZoneKind::Refractory);
        if capacity[refractory] > 0.0 {
            energy[refractory] -= model.couplings.refractory_ambient
                * (t[refractory] - model.ambient_temperature_k)
                * h;
        }
        for kind in MATERIAL_ZONES {
            let i = slot(kind);
            if capacity[i] > 0.0 {
                t[i] += ensure_finite(energy[i] / capacity[i], "temperature change")?;
            }
        }
    }

    for kind in MATERIAL_ZONES {
        let temperature = ensure_finite(t[slot(kind)], "zone temperature")?;
        if temperature < 0.0 {
            return Err(PhysicsError::NonPhysical {
                what: format!("{kind} temperature fell to {temperature} K"),
            });
        }
    }
    Ok(t)
}

/// Advance the furnace by one tick of length `dt` seconds.
///
/// `injections` are merged after reactions. Any non-finite intermediate is
/// reported as [`PhysicsError::NonFinite`]; the input is never touched.
pub fn step(
    state: &FurnaceState,
    params: &OperatingParameters,
    injections: &[MaterialInjection],
    model: &FurnaceModel,
    dt: f64,
) -> PhysicsResult<StepReport> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(PhysicsError::InvalidArg {
            what: "dt must be positive",
        });
    }
    let mut next = state.clone();
    let zones = &state.zones;

    // 1. Electrical power
    let requested_w = ensure_finite(params.arc_power_w(), "arc power")?;
    let delivered_w = requested_w.clamp(0.0, model.max_power_w);
    let power = PowerReading {
        requested_w,
        delivered_w,
        clamped: requested_w > model.max_power_w,
    };

    // 2. Heat sources over dt
    let mut source_j = [0.0_f64; 4];
    let arc_heat_j = delivered_w * model.arc_efficiency * dt;
    // The arc holds no mass; its heat is radiated straight to the material zones.
    for kind in MATERIAL_ZONES {
        source_j[slot(kind)] += arc_heat_j * model.arc_split.share(kind);
    }
    source_j[slot(ZoneKind::LiquidMetal)] += state.pending_reaction_heat_j;

    // 3. Heat exchange and temperature update
    let temperatures = exchange_heat(zones, &source_j, model, dt)?;
    for kind in MATERIAL_ZONES {
        let zone = next.zones.get_mut(kind);
        if zone.mass_kg > 0.0 {
            zone.temperature_k = temperatures[slot(kind)];
        }
    }
    let metal_before = zones.get(ZoneKind::LiquidMetal);
    let metal_after = next.zones.get(ZoneKind::LiquidMetal);
    let useful_heat_j = clamp_non_negative(
        (metal_after.temperature_k - metal_before.temperature_k)
            * metal_before.mass_kg
            * model.specific_heat.liquid_metal,
    );

    // 4. Chemical reactions, driven by the bath temperature at the start of the tick
    let bath_k = metal_before.temperature_k;
    let mut reactions = Vec::new();
    let mut reaction_heat_j = 0.0;
    for reaction in &model.reactions {
        if bath_k <= reaction.ignition_k {
            continue;
        }
        let activation = 1.0 - (-(bath_k - reaction.ignition_k) / model.activation_ramp_k).exp();
        let demand_kg = ensure_finite(
            params.oxygen_flow_rate * reaction.yield_kg_per_m3 * activation * dt,
            "oxidation demand",
        )?;
        let consumed_kg = next
            .zones
            .liquid_metal
            .remove_species(&reaction.element, demand_kg)?;
        if consumed_kg <= 0.0 {
            continue;
        }
        next.zones.slag.add_species(&reaction.product, consumed_kg)?;
        let heat_j = consumed_kg * reaction.heat_j_per_kg;
        reaction_heat_j += heat_j;
        reactions.push(ReactionOutcome {
            element: reaction.element.clone(),
            product: reaction.product.clone(),
            consumed_kg,
            heat_j,
        });
    }
    next.pending_reaction_heat_j = ensure_finite(reaction_heat_j, "reaction heat")?;

    // 5. Material application
    let mut injected_kg = 0.0;
    for injection in injections {
        if !injection.zone.accepts_material() {
            return Err(FurnaceError::ZoneRejectsMaterial(injection.zone).into());
        }
        next.zones.get_mut(injection.zone).merge(
            injection.mass_kg,
            &composition_for(&injection.material),
            model.ambient_temperature_k,
        )?;
        injected_kg += injection.mass_kg;
    }

    // 6. Derived metrics
    let input_j = delivered_w * dt;
    next.cumulative_energy_j =
        ensure_finite(state.cumulative_energy_j + input_j, "cumulative energy")?;
    next.efficiency.push(useful_heat_j, input_j);
    next.current_power_w = delivered_w;
    next.tick = state.tick + 1;
    next.time_s = next.tick as f64 * dt;

    for zone in next.zones.iter() {
        ensure_finite(zone.temperature_k, "zone temperature")?;
        ensure_finite(zone.mass_kg, "zone mass")?;
    }

    Ok(StepReport {
        state: next,
        power,
        reactions,
        useful_heat_j,
        injected_kg,
    })
}
