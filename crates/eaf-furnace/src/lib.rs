//! Furnace physics for the arc furnace simulator.
//!
//! Provides:
//! - Zone state (arc, liquid metal, slag, refractory) with mass-fraction compositions
//! - Material catalog and the injection ledger
//! - Operating parameters with range-checked partial updates
//! - Alert threshold evaluation
//! - The pure per-tick physics step

pub mod alerts;
pub mod composition;
pub mod error;
pub mod ledger;
pub mod materials;
pub mod model;
pub mod params;
pub mod physics;
pub mod zone;

pub use alerts::{Alert, AlertKind, AlertReport, AlertSeverity, AlertThresholds};
pub use composition::Composition;
pub use error::{FurnaceError, FurnaceResult, PhysicsError, PhysicsResult};
pub use ledger::{InjectionSource, MaterialInjection, MaterialLedger, feed_injections};
pub use materials::{MaterialSpec, composition_for, lookup_material};
pub use model::{ArcSplit, Couplings, FurnaceModel, OxidationReaction, SpecificHeats};
pub use params::{OperatingParameters, ParamField, ParameterPatch};
pub use physics::{
    EfficiencyWindow, FurnaceState, PowerReading, ReactionOutcome, StepReport, arc_length_m, step,
};
pub use zone::{Zone, ZoneKind, ZoneSet};
