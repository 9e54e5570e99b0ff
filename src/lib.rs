#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod effect;
mod error;
mod host;
mod parameter;
mod visualizer;

// public, flat re-exports
pub use error::Error;

pub use effect::{Effect, EffectTime};

pub use host::{EffectHost, HostState, Transport};

pub use parameter::{
    BooleanParameter, BooleanParameterValue, ClonableParameter, EnumParameter,
    EnumParameterValue, FloatDisplay, FloatParameter, FloatParameterValue, IntegerParameter,
    IntegerParameterValue, Parameter, ParameterHandle, ParameterState, ParameterType,
    ParameterValueUpdate, SmoothedParameterValue, STATE_VERSION,
};

pub use visualizer::{
    DelaySnapshot, DelayVisualizer, GranularSnapshot, GranularVisualizer, MAX_TAP_LEVELS,
};

// public mods
pub mod utils;

/// The effect engines.
pub mod effects {
    pub use super::effect::{
        drift::{duck_gain, DriftDelayEffect},
        granular::{grain_envelope, GranularEffect},
    };
}
