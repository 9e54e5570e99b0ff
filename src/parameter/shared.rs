use std::{fmt::Debug, sync::Arc};

use four_cc::FourCC;

use super::{ClonableParameter, Parameter, ParameterType};
use crate::{utils::AtomicF32, Error};

// -------------------------------------------------------------------------------------------------

/// Version of the [`ParameterState`] format, written by [`ParameterHandle::state`].
pub const STATE_VERSION: u32 = 6;

// -------------------------------------------------------------------------------------------------

/// A persistable snapshot of all plain parameter values of an effect.
///
/// Parameter ids are stored as strings. Audio buffer contents are never part of the state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParameterState {
    pub version: u32,
    pub values: Vec<(String, f32)>,
}

impl ParameterState {
    /// Look up a plain value by its parameter id.
    pub fn value(&self, id: FourCC) -> Option<f32> {
        let id = id.to_string();
        self.values
            .iter()
            .find_map(|(key, value)| (*key == id).then_some(*value))
    }
}

// -------------------------------------------------------------------------------------------------

struct ParameterSlot {
    id: FourCC,
    descriptor: Box<dyn Parameter>,
    parameter_type: ParameterType,
    value: AtomicF32,
}

impl Debug for ParameterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSlot")
            .field("id", &self.id)
            .field("value", &self.value.load())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------

/// Shared, lock-free store of an effect's plain parameter values.
///
/// Control threads (UIs, automation, the host) write values, the audio thread pulls them once per
/// processed block. Each value is read and written atomically, but there is no consistency
/// between separate values: a block may see some values of an update batch only.
///
/// Handles are cheap to clone and can be sent to any thread.
#[derive(Debug, Clone)]
pub struct ParameterHandle {
    slots: Arc<[ParameterSlot]>,
}

impl ParameterHandle {
    /// Create a new store for the given parameter descriptors, initialized to their defaults.
    pub fn new(parameters: &[&dyn ClonableParameter]) -> Self {
        let slots = parameters
            .iter()
            .map(|parameter| {
                let parameter_type = parameter.parameter_type();
                ParameterSlot {
                    id: parameter.id(),
                    descriptor: parameter.dyn_clone(),
                    value: AtomicF32::new(parameter_type.plain_default()),
                    parameter_type,
                }
            })
            .collect::<Vec<_>>();
        debug_assert!(
            slots
                .iter()
                .enumerate()
                .all(|(index, slot)| slots[..index].iter().all(|other| other.id != slot.id)),
            "Duplicate parameter ids"
        );
        Self {
            slots: slots.into(),
        }
    }

    /// Descriptors of all parameters in this store.
    pub fn parameters(&self) -> impl Iterator<Item = &dyn Parameter> {
        self.slots.iter().map(|slot| slot.descriptor.as_ref())
    }

    /// Ids of all parameters in this store.
    pub fn ids(&self) -> impl Iterator<Item = FourCC> + '_ {
        self.slots.iter().map(|slot| slot.id)
    }

    /// Current plain values of all parameters, in declaration order.
    ///
    /// Does not allocate, so it can be used in real-time threads.
    pub fn values(&self) -> impl Iterator<Item = (FourCC, f32)> + '_ {
        self.slots.iter().map(|slot| (slot.id, slot.value.load()))
    }

    fn slot(&self, id: FourCC) -> Result<&ParameterSlot, Error> {
        self.slots
            .iter()
            .find(|slot| slot.id == id)
            .ok_or_else(|| Error::ParameterError(format!("Unknown parameter: '{id}'")))
    }

    /// The current plain value of the given parameter.
    pub fn value(&self, id: FourCC) -> Result<f32, Error> {
        Ok(self.slot(id)?.value.load())
    }

    /// The current value of the given parameter, normalized to range `0.0..=1.0`.
    pub fn normalized_value(&self, id: FourCC) -> Result<f32, Error> {
        let slot = self.slot(id)?;
        Ok(slot.parameter_type.normalize_plain(slot.value.load()))
    }

    /// The current value of the given parameter, formatted by its descriptor.
    pub fn value_string(&self, id: FourCC) -> Result<String, Error> {
        let slot = self.slot(id)?;
        let normalized = slot.parameter_type.normalize_plain(slot.value.load());
        Ok(slot.descriptor.value_to_string(normalized, true))
    }

    /// Set a new plain value. Values get clamped into the parameter's range, and rounded for
    /// integer, enum and boolean parameters.
    pub fn set(&self, id: FourCC, value: f32) -> Result<(), Error> {
        let slot = self.slot(id)?;
        slot.value.store(slot.parameter_type.clamp_plain(value));
        Ok(())
    }

    /// Set a new value from a normalized value in range `0.0..=1.0`.
    pub fn set_normalized(&self, id: FourCC, normalized: f32) -> Result<(), Error> {
        let slot = self.slot(id)?;
        slot.value
            .store(slot.parameter_type.denormalize_plain(normalized));
        Ok(())
    }

    /// Set a new value from a string, parsed by the parameter's descriptor.
    pub fn set_string(&self, id: FourCC, string: &str) -> Result<(), Error> {
        let slot = self.slot(id)?;
        let normalized = slot
            .descriptor
            .string_to_value(string.to_string())
            .ok_or_else(|| {
                Error::ParameterError(format!("Invalid value '{string}' for parameter '{id}'"))
            })?;
        slot.value
            .store(slot.parameter_type.denormalize_plain(normalized));
        Ok(())
    }

    /// Reset all parameters to their default values.
    pub fn reset_to_defaults(&self) {
        for slot in self.slots.iter() {
            slot.value.store(slot.parameter_type.plain_default());
        }
    }

    /// Capture all current plain values.
    pub fn state(&self) -> ParameterState {
        ParameterState {
            version: STATE_VERSION,
            values: self
                .slots
                .iter()
                .map(|slot| (slot.id.to_string(), slot.value.load()))
                .collect(),
        }
    }

    /// Apply a previously captured state.
    ///
    /// Values of known parameters get clamped into their ranges. Unknown parameter ids are
    /// skipped. Parameters which are missing in the state keep their current values.
    /// States with a version newer than [`STATE_VERSION`] are rejected.
    pub fn restore(&self, state: &ParameterState) -> Result<(), Error> {
        if state.version > STATE_VERSION {
            return Err(Error::StateError(format!(
                "Unsupported state version {} (expected <= {STATE_VERSION})",
                state.version
            )));
        }
        for (id, value) in &state.values {
            if let Some(slot) = self.slots.iter().find(|slot| slot.id.to_string() == *id) {
                slot.value.store(slot.parameter_type.clamp_plain(*value));
            } else {
                log::warn!("Ignoring unknown parameter '{id}' in restored state");
            }
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
