//! Filters for effects.

pub mod svf;
