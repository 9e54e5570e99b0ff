//! Effect parameter descriptors, value wrappers and the shared, cross-thread parameter store.

use std::{any::Any, fmt::Debug, ops::RangeInclusive};

use four_cc::FourCC;

// -------------------------------------------------------------------------------------------------

/// Describes the type of a [`Parameter`] to e.g. select a proper visual representation in a UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterType {
    /// A continuous floating-point value.
    Float {
        range: RangeInclusive<f32>,
        default: f32,
    },
    /// A discrete integer value.
    Integer {
        range: RangeInclusive<i32>,
        default: i32,
    },
    /// A choice from a list of strings (an enum).
    Enum {
        values: Vec<String>,
        default_index: usize,
    },
    /// A boolean toggle.
    Boolean { default: bool },
}

impl ParameterType {
    /// The plain value range, with integers, enum indices and booleans expressed as `f32`.
    pub fn plain_range(&self) -> RangeInclusive<f32> {
        match self {
            Self::Float { range, .. } => range.clone(),
            Self::Integer { range, .. } => *range.start() as f32..=*range.end() as f32,
            Self::Enum { values, .. } => 0.0..=values.len().saturating_sub(1) as f32,
            Self::Boolean { .. } => 0.0..=1.0,
        }
    }

    /// The plain default value.
    pub fn plain_default(&self) -> f32 {
        match self {
            Self::Float { default, .. } => *default,
            Self::Integer { default, .. } => *default as f32,
            Self::Enum { default_index, .. } => *default_index as f32,
            Self::Boolean { default } => {
                if *default {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// True for parameters with discrete steps only.
    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::Float { .. })
    }

    /// Clamp a plain value into the parameter's range, rounding it for discrete types.
    pub fn clamp_plain(&self, value: f32) -> f32 {
        let range = self.plain_range();
        let value = if value.is_nan() {
            self.plain_default()
        } else {
            value.clamp(*range.start(), *range.end())
        };
        if self.is_discrete() {
            value.round()
        } else {
            value
        }
    }

    /// Normalize a plain value to a 0.0-1.0 range.
    pub fn normalize_plain(&self, value: f32) -> f32 {
        let range = self.plain_range();
        let span = *range.end() - *range.start();
        if span > 0.0 {
            ((self.clamp_plain(value) - *range.start()) / span).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Denormalize a 0.0-1.0 ranged value to the corresponding, clamped plain value.
    pub fn denormalize_plain(&self, normalized: f32) -> f32 {
        let range = self.plain_range();
        let normalized = normalized.clamp(0.0, 1.0);
        self.clamp_plain(*range.start() + normalized * (*range.end() - *range.start()))
    }
}

// -------------------------------------------------------------------------------------------------

/// Describes a single parameter of an [`Effect`](super::Effect) for use in UIs or for automation.
pub trait Parameter: Debug + Send + Sync {
    /// The unique id of the parameter.
    fn id(&self) -> FourCC;

    /// The name of the parameter.
    fn name(&self) -> &'static str;

    /// The parameter type.
    fn parameter_type(&self) -> ParameterType;

    /// Default value of parameter, expressed as normalized floating point value in range \[0,1\].
    fn default_value(&self) -> f32;

    /// Convert the given normalized floating point value to a string value.
    fn value_to_string(&self, value: f32, include_unit: bool) -> String;

    /// Convert the given string value to a normalized floating point value.
    /// Returns `None` when conversion failed, else a valid normalized value.
    fn string_to_value(&self, string: String) -> Option<f32>;
}

/// Allows creating `dyn Parameter` clones.
pub trait ClonableParameter: Parameter {
    /// Create a dyn Parameter clone, wrapped into a box.
    fn dyn_clone(&self) -> Box<dyn Parameter>;
}

impl<P> ClonableParameter for P
where
    P: Parameter + Clone + 'static,
{
    fn dyn_clone(&self) -> Box<dyn Parameter> {
        Box::new(Self::clone(self))
    }
}

// -------------------------------------------------------------------------------------------------

/// An update for a [`Parameter`]'s value, consumed by [`Effect`](super::Effect)s in audio time.
#[derive(Debug)]
pub enum ParameterValueUpdate {
    /// Raw, type-erased internal value (f32, i32, some Enum or boolean).
    Raw(Box<dyn Any + Send + Sync>),
    /// A float value in range `0.0..=1.0`.
    Normalized(f32),
}

// -------------------------------------------------------------------------------------------------

mod float;
pub use float::{FloatDisplay, FloatParameter, FloatParameterValue};

mod smoothed;
pub use smoothed::SmoothedParameterValue;

mod integer;
pub use integer::{IntegerParameter, IntegerParameterValue};

mod r#enum;
pub use r#enum::{EnumParameter, EnumParameterValue};

mod boolean;
pub use boolean::{BooleanParameter, BooleanParameterValue};

mod shared;
pub use shared::{ParameterHandle, ParameterState, STATE_VERSION};

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_value_conversions() {
        let float = ParameterType::Float {
            range: 10.0..=500.0,
            default: 100.0,
        };
        assert_eq!(float.clamp_plain(1000.0), 500.0);
        assert_eq!(float.clamp_plain(f32::NAN), 100.0);
        assert_eq!(float.denormalize_plain(0.5), 255.0);
        assert_eq!(float.normalize_plain(10.0), 0.0);

        let integer = ParameterType::Integer {
            range: 1..=4,
            default: 2,
        };
        assert_eq!(integer.clamp_plain(2.6), 3.0);
        assert_eq!(integer.denormalize_plain(1.0), 4.0);
        assert_eq!(integer.normalize_plain(2.0), 1.0 / 3.0);

        let choice = ParameterType::Enum {
            values: vec!["a".into(), "b".into(), "c".into()],
            default_index: 1,
        };
        assert_eq!(choice.plain_default(), 1.0);
        assert_eq!(choice.clamp_plain(7.0), 2.0);
        assert_eq!(choice.denormalize_plain(0.4), 1.0);

        let toggle = ParameterType::Boolean { default: true };
        assert_eq!(toggle.plain_default(), 1.0);
        assert_eq!(toggle.clamp_plain(0.3), 0.0);
        assert_eq!(toggle.denormalize_plain(0.6), 1.0);
    }
}
