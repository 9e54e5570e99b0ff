//! Common, shared DSP tools for effects.

pub mod allpass;
pub mod delay;
pub mod envelope;
pub mod filters;
pub mod lfo;
pub mod saturation;
pub mod tempo;
