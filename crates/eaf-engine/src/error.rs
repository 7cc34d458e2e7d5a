//! Error types for the control surface, configuration and runtime.

use std::fmt;
use std::path::PathBuf;

use eaf_furnace::{FurnaceError, ParamField, PhysicsError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse grouping of [`ControlError`]s so a caller can tell "fix the input
/// and retry" apart from "the run is over".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    State,
    Numeric,
    Delivery,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::State => "state",
            ErrorCategory::Numeric => "numeric",
            ErrorCategory::Delivery => "delivery",
        }
    }

    /// Validation and state errors are recovered by the caller.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCategory::Validation | ErrorCategory::State)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by control operations and subscriptions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Parameter {field} out of range: {value}")]
    OutOfRange { field: ParamField, value: f64 },

    #[error("Unknown parameter field: {0}")]
    UnknownField(String),

    #[error("Malformed parameter payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid material amount: {value} kg")]
    InvalidAmount { value: f64 },

    #[error("Unknown or closed zone: {0}")]
    UnknownZone(String),

    #[error("Invalid material: {0}")]
    InvalidMaterial(String),

    #[error("Invalid run configuration ({key}): {message}")]
    InvalidConfig { key: String, message: String },

    #[error("Simulation already running")]
    AlreadyRunning,

    #[error("Simulation not running")]
    NotRunning,

    #[error("Simulation already stopped")]
    AlreadyStopped,

    #[error("Simulation stopped")]
    Stopped,

    #[error("Numeric fault in {what}")]
    NumericFault { what: String, message: String },

    #[error("Subscription closed")]
    SubscriptionClosed,
}

pub type ControlResult<T> = Result<T, ControlError>;

impl ControlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ControlError::OutOfRange { .. }
            | ControlError::UnknownField(_)
            | ControlError::InvalidPayload(_)
            | ControlError::InvalidAmount { .. }
            | ControlError::UnknownZone(_)
            | ControlError::InvalidMaterial(_)
            | ControlError::InvalidConfig { .. } => ErrorCategory::Validation,
            ControlError::AlreadyRunning
            | ControlError::NotRunning
            | ControlError::AlreadyStopped
            | ControlError::Stopped => ErrorCategory::State,
            ControlError::NumericFault { .. } => ErrorCategory::Numeric,
            ControlError::SubscriptionClosed => ErrorCategory::Delivery,
        }
    }

    /// Stable machine-readable code, e.g. `out_of_range:arc_voltage`.
    pub fn code(&self) -> String {
        match self {
            ControlError::OutOfRange { field, .. } => format!("out_of_range:{field}"),
            ControlError::UnknownField(name) => format!("unknown_field:{name}"),
            ControlError::InvalidPayload(_) => "invalid_payload".to_string(),
            ControlError::InvalidAmount { .. } => "invalid_amount".to_string(),
            ControlError::UnknownZone(_) => "unknown_zone".to_string(),
            ControlError::InvalidMaterial(_) => "invalid_material".to_string(),
            ControlError::InvalidConfig { key, .. } => format!("invalid_config:{key}"),
            ControlError::AlreadyRunning => "already_running".to_string(),
            ControlError::NotRunning => "not_running".to_string(),
            ControlError::AlreadyStopped => "already_stopped".to_string(),
            ControlError::Stopped => "stopped".to_string(),
            ControlError::NumericFault { what, .. } => format!("numeric_fault:{what}"),
            ControlError::SubscriptionClosed => "subscription_closed".to_string(),
        }
    }
}

impl From<FurnaceError> for ControlError {
    fn from(e: FurnaceError) -> Self {
        match e {
            FurnaceError::OutOfRange { field, value } => ControlError::OutOfRange { field, value },
            FurnaceError::UnknownField(name) => ControlError::UnknownField(name),
            FurnaceError::InvalidPatch(msg) => ControlError::InvalidPayload(msg),
            FurnaceError::InvalidAmount { value } => ControlError::InvalidAmount { value },
            FurnaceError::UnknownZone(zone) => ControlError::UnknownZone(zone),
            FurnaceError::ZoneRejectsMaterial(zone) => ControlError::UnknownZone(zone.to_string()),
            other => ControlError::InvalidMaterial(other.to_string()),
        }
    }
}

impl From<PhysicsError> for ControlError {
    fn from(e: PhysicsError) -> Self {
        let what = match &e {
            PhysicsError::NonFinite { what, .. } => what.replace(' ', "_"),
            PhysicsError::InvalidArg { .. } => "invalid_argument".to_string(),
            PhysicsError::NonPhysical { .. } => "non_physical".to_string(),
        };
        ControlError::NumericFault {
            what,
            message: e.to_string(),
        }
    }
}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        ControlError::InvalidConfig {
            key: e.key(),
            message: e.to_string(),
        }
    }
}

/// Errors loading or validating a [`crate::RunConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error(transparent)]
    Furnace(#[from] FurnaceError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }

    /// Short key naming the offending part of the config.
    pub fn key(&self) -> String {
        match self {
            ConfigError::Read { .. } => "path".to_string(),
            ConfigError::Yaml(_) => "yaml".to_string(),
            ConfigError::Invalid { key, .. } => (*key).to_string(),
            ConfigError::Furnace(FurnaceError::OutOfRange { field, .. }) => field.to_string(),
            ConfigError::Furnace(
                FurnaceError::InvalidAmount { .. }
                | FurnaceError::UnknownZone(_)
                | FurnaceError::ZoneRejectsMaterial(_),
            ) => "initial_materials".to_string(),
            ConfigError::Furnace(_) => "model".to_string(),
        }
    }
}

/// Errors from the threaded runtime.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    #[error("Encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
