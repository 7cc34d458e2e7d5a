//! Operating parameters and range-checked partial updates.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FurnaceError, FurnaceResult};

/// Named, typed fields of [`OperatingParameters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamField {
    ArcVoltage,
    ArcCurrent,
    PowerFactor,
    ElectrodePosition,
    OxygenFlowRate,
    CarbonInjectionRate,
    LimeAdditionRate,
    DolomiteAdditionRate,
}

impl ParamField {
    pub const ALL: [ParamField; 8] = [
        ParamField::ArcVoltage,
        ParamField::ArcCurrent,
        ParamField::PowerFactor,
        ParamField::ElectrodePosition,
        ParamField::OxygenFlowRate,
        ParamField::CarbonInjectionRate,
        ParamField::LimeAdditionRate,
        ParamField::DolomiteAdditionRate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamField::ArcVoltage => "arc_voltage",
            ParamField::ArcCurrent => "arc_current",
            ParamField::PowerFactor => "power_factor",
            ParamField::ElectrodePosition => "electrode_position",
            ParamField::OxygenFlowRate => "oxygen_flow_rate",
            ParamField::CarbonInjectionRate => "carbon_injection_rate",
            ParamField::LimeAdditionRate => "lime_addition_rate",
            ParamField::DolomiteAdditionRate => "dolomite_addition_rate",
        }
    }

    pub fn from_name(name: &str) -> Option<ParamField> {
        ParamField::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// Whether `value` is inside this field's admissible range.
    pub fn admits(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            ParamField::ArcVoltage | ParamField::ArcCurrent => value > 0.0,
            ParamField::PowerFactor => value > 0.0 && value <= 1.0,
            ParamField::ElectrodePosition
            | ParamField::OxygenFlowRate
            | ParamField::CarbonInjectionRate
            | ParamField::LimeAdditionRate
            | ParamField::DolomiteAdditionRate => value >= 0.0,
        }
    }

    fn check(self, value: f64) -> FurnaceResult<f64> {
        if self.admits(value) {
            Ok(value)
        } else {
            Err(FurnaceError::OutOfRange { field: self, value })
        }
    }
}

impl fmt::Display for ParamField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Electrical and feed settings of the furnace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperatingParameters {
    /// Arc voltage (V)
    pub arc_voltage: f64,
    /// Arc current (A)
    pub arc_current: f64,
    /// Real/apparent power ratio, (0, 1]
    pub power_factor: f64,
    /// Electrode position measured from the roof (m)
    pub electrode_position: f64,
    /// Lance oxygen (m³/s)
    pub oxygen_flow_rate: f64,
    /// Carbon injection (kg/s)
    pub carbon_injection_rate: f64,
    /// Lime addition (kg/s)
    pub lime_addition_rate: f64,
    /// Dolomite addition (kg/s)
    pub dolomite_addition_rate: f64,
}

impl Default for OperatingParameters {
    fn default() -> Self {
        Self {
            arc_voltage: 400.0,
            arc_current: 50_000.0,
            power_factor: 0.8,
            electrode_position: 2.0,
            oxygen_flow_rate: 0.5,
            carbon_injection_rate: 0.1,
            lime_addition_rate: 0.05,
            dolomite_addition_rate: 0.03,
        }
    }
}

impl OperatingParameters {
    pub fn get(&self, field: ParamField) -> f64 {
        match field {
            ParamField::ArcVoltage => self.arc_voltage,
            ParamField::ArcCurrent => self.arc_current,
            ParamField::PowerFactor => self.power_factor,
            ParamField::ElectrodePosition => self.electrode_position,
            ParamField::OxygenFlowRate => self.oxygen_flow_rate,
            ParamField::CarbonInjectionRate => self.carbon_injection_rate,
            ParamField::LimeAdditionRate => self.lime_addition_rate,
            ParamField::DolomiteAdditionRate => self.dolomite_addition_rate,
        }
    }

    fn set(&mut self, field: ParamField, value: f64) {
        let slot = match field {
            ParamField::ArcVoltage => &mut self.arc_voltage,
            ParamField::ArcCurrent => &mut self.arc_current,
            ParamField::PowerFactor => &mut self.power_factor,
            ParamField::ElectrodePosition => &mut self.electrode_position,
            ParamField::OxygenFlowRate => &mut self.oxygen_flow_rate,
            ParamField::CarbonInjectionRate => &mut self.carbon_injection_rate,
            ParamField::LimeAdditionRate => &mut self.lime_addition_rate,
            ParamField::DolomiteAdditionRate => &mut self.dolomite_addition_rate,
        };
        *slot = value;
    }

    /// Check every field; reports the first one out of range.
    pub fn validate(&self) -> FurnaceResult<()> {
        for field in ParamField::ALL {
            field.check(self.get(field))?;
        }
        Ok(())
    }

    /// Real electrical power `V × I × pf` (W).
    pub fn arc_power_w(&self) -> f64 {
        self.arc_voltage * self.arc_current * self.power_factor
    }
}

/// Partial parameter update. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arc_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arc_current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub electrode_position: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen_flow_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbon_injection_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lime_addition_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dolomite_addition_rate: Option<f64>,
}

impl ParameterPatch {
    /// Patch touching a single field.
    pub fn single(field: ParamField, value: f64) -> Self {
        let mut patch = Self::default();
        *patch.slot(field) = Some(value);
        patch
    }

    fn slot(&mut self, field: ParamField) -> &mut Option<f64> {
        match field {
            ParamField::ArcVoltage => &mut self.arc_voltage,
            ParamField::ArcCurrent => &mut self.arc_current,
            ParamField::PowerFactor => &mut self.power_factor,
            ParamField::ElectrodePosition => &mut self.electrode_position,
            ParamField::OxygenFlowRate => &mut self.oxygen_flow_rate,
            ParamField::CarbonInjectionRate => &mut self.carbon_injection_rate,
            ParamField::LimeAdditionRate => &mut self.lime_addition_rate,
            ParamField::DolomiteAdditionRate => &mut self.dolomite_addition_rate,
        }
    }

    pub fn get(&self, field: ParamField) -> Option<f64> {
        match field {
            ParamField::ArcVoltage => self.arc_voltage,
            ParamField::ArcCurrent => self.arc_current,
            ParamField::PowerFactor => self.power_factor,
            ParamField::ElectrodePosition => self.electrode_position,
            ParamField::OxygenFlowRate => self.oxygen_flow_rate,
            ParamField::CarbonInjectionRate => self.carbon_injection_rate,
            ParamField::LimeAdditionRate => self.lime_addition_rate,
            ParamField::DolomiteAdditionRate => self.dolomite_addition_rate,
        }
    }

    /// Provided `(field, value)` pairs in schema order.
    pub fn fields(&self) -> Vec<(ParamField, f64)> {
        ParamField::ALL
            .into_iter()
            .filter_map(|field| self.get(field).map(|v| (field, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Parse a JSON object against the fixed parameter schema.
    ///
    /// Unknown keys are rejected by name, non-numeric values are reported as
    /// out of range for their field, and every provided value is range-checked.
    pub fn from_json(payload: &str) -> FurnaceResult<Self> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| FurnaceError::InvalidPatch(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(FurnaceError::InvalidPatch(
                "expected a JSON object".to_string(),
            ));
        };

        let mut patch = Self::default();
        for (key, raw) in &map {
            let field =
                ParamField::from_name(key).ok_or_else(|| FurnaceError::UnknownField(key.clone()))?;
            let value = raw.as_f64().ok_or(FurnaceError::OutOfRange {
                field,
                value: f64::NAN,
            })?;
            *patch.slot(field) = Some(value);
        }
        patch.validate()?;
        Ok(patch)
    }

    /// Range-check every provided field.
    pub fn validate(&self) -> FurnaceResult<()> {
        for (field, value) in self.fields() {
            field.check(value)?;
        }
        Ok(())
    }

    /// Apply on top of `base`, returning the merged parameters.
    pub fn apply_to(&self, base: &OperatingParameters) -> FurnaceResult<OperatingParameters> {
        self.validate()?;
        let mut next = *base;
        for (field, value) in self.fields() {
            next.set(field, value);
        }
        Ok(next)
    }
}
