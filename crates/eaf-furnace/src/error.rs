//! Error types for furnace state and physics.

use eaf_core::CoreError;
use thiserror::Error;

use crate::params::ParamField;
use crate::zone::ZoneKind;

/// Errors raised while building or mutating furnace data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FurnaceError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Parameter {field} out of range: {value}")]
    OutOfRange { field: ParamField, value: f64 },

    #[error("Unknown parameter field: {0}")]
    UnknownField(String),

    #[error("Malformed parameter payload: {0}")]
    InvalidPatch(String),

    #[error("Invalid material amount: {value} kg")]
    InvalidAmount { value: f64 },

    #[error("Unknown zone: {0}")]
    UnknownZone(String),

    #[error("Zone {0} does not accept material")]
    ZoneRejectsMaterial(ZoneKind),

    #[error("Non-physical condition: {what}")]
    NonPhysical { what: &'static str },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type FurnaceResult<T> = Result<T, FurnaceError>;

/// Errors from the physics step. Every variant is fatal to a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Non-finite value in {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-physical condition: {what}")]
    NonPhysical { what: String },
}

pub type PhysicsResult<T> = Result<T, PhysicsError>;

impl From<CoreError> for PhysicsError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NonFinite { what, value } => PhysicsError::NonFinite { what, value },
            CoreError::InvalidArg { what } => PhysicsError::InvalidArg { what },
            other => PhysicsError::NonPhysical {
                what: other.to_string(),
            },
        }
    }
}

impl From<FurnaceError> for PhysicsError {
    fn from(e: FurnaceError) -> Self {
        match e {
            FurnaceError::Core(core) => core.into(),
            other => PhysicsError::NonPhysical {
                what: other.to_string(),
            },
        }
    }
}
