use std::{fmt::Debug, str::FromStr};

use four_cc::FourCC;
use strum::IntoEnumIterator;

use super::{Parameter, ParameterType, ParameterValueUpdate};

// -------------------------------------------------------------------------------------------------

/// An enum parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameter {
    id: FourCC,
    name: &'static str,
    values: Vec<String>,
    default_index: usize,
}

impl EnumParameter {
    pub fn new<E: IntoEnumIterator + ToString + PartialEq>(
        id: FourCC,
        name: &'static str,
        default: E,
    ) -> Self {
        let values = E::iter().map(|v| v.to_string()).collect::<Vec<_>>();
        assert!(!values.is_empty(), "Enum parameters need at least one value");
        let default_index = E::iter().position(|r| r == default).unwrap_or(0);
        Self {
            id,
            name,
            values,
            default_index,
        }
    }

    pub const fn id(&self) -> FourCC {
        self.id
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn default_index(&self) -> usize {
        self.default_index
    }

    pub fn default_value(&self) -> &String {
        &self.values[self.default_index]
    }

    pub fn normalize_index(&self, index: usize) -> f32 {
        if self.values.len() > 1 {
            index.min(self.values.len() - 1) as f32 / (self.values.len() - 1) as f32
        } else {
            0.0
        }
    }

    pub fn denormalize_index(&self, normalized: f32) -> usize {
        assert!((0.0..=1.0).contains(&normalized));
        (normalized * (self.values.len() - 1) as f32).round() as usize
    }
}

impl Parameter for EnumParameter {
    fn id(&self) -> FourCC {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn parameter_type(&self) -> ParameterType {
        ParameterType::Enum {
            values: self.values.clone(),
            default_index: self.default_index,
        }
    }

    fn default_value(&self) -> f32 {
        self.normalize_index(self.default_index)
    }

    fn value_to_string(&self, normalized: f32, _include_unit: bool) -> String {
        self.values[self.denormalize_index(normalized.clamp(0.0, 1.0))].clone()
    }

    fn string_to_value(&self, string: String) -> Option<f32> {
        let string = string.trim();
        let index = self.values.iter().position(|v| v.eq_ignore_ascii_case(string))?;
        Some(self.normalize_index(index))
    }
}

// -------------------------------------------------------------------------------------------------

/// Holds an enum parameter value and its description.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumParameterValue<T: Sized + Clone> {
    /// The current value of the parameter.
    value: T,
    /// The parameter's description and constraints.
    description: EnumParameter,
}

impl<T> EnumParameterValue<T>
where
    T: IntoEnumIterator + FromStr + Copy + PartialEq + Send + Sync + 'static,
    <T as FromStr>::Err: Debug,
{
    pub fn from_description(description: EnumParameter) -> Self {
        let value = T::iter()
            .nth(description.default_index())
            .or_else(|| T::iter().next())
            .expect("Enum parameters need at least one value");
        Self { value, description }
    }

    #[inline(always)]
    pub fn value(&self) -> T {
        self.value
    }

    pub fn set_value(&mut self, value: T) {
        self.value = value;
    }

    /// The current value's index in the enum's value list.
    pub fn index(&self) -> usize {
        T::iter().position(|v| v == self.value).unwrap_or(0)
    }

    /// Set a new value by its index. Out of range indices are ignored.
    pub fn set_index(&mut self, index: usize) {
        if let Some(value) = T::iter().nth(index) {
            self.value = value;
        }
    }

    pub fn description(&self) -> &EnumParameter {
        &self.description
    }

    pub fn apply_update(&mut self, update: &ParameterValueUpdate) {
        match update {
            ParameterValueUpdate::Raw(raw) => {
                if let Some(value) = raw.downcast_ref::<T>() {
                    self.set_value(*value);
                } else if let Some(index) = raw.downcast_ref::<usize>() {
                    self.set_index(*index);
                } else if let Some(value_str) = raw.downcast_ref::<String>() {
                    if let Ok(value) = T::from_str(value_str) {
                        self.set_value(value);
                    } else {
                        log::warn!(
                            "Invalid string value for enum parameter '{}'",
                            self.description.id()
                        );
                    }
                } else {
                    log::warn!(
                        "Invalid value type for enum parameter '{}'",
                        self.description.id()
                    );
                }
            }
            ParameterValueUpdate::Normalized(normalized) => {
                let index = self
                    .description
                    .denormalize_index(normalized.clamp(0.0, 1.0));
                self.set_index(index);
            }
        }
    }
}

impl<T> From<EnumParameter> for EnumParameterValue<T>
where
    T: IntoEnumIterator + FromStr + Copy + PartialEq + Send + Sync + 'static,
    <T as FromStr>::Err: Debug,
{
    fn from(description: EnumParameter) -> Self {
        Self::from_description(description)
    }
}

// -------------------------------------------------------------------------------------------------
