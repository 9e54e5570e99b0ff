use std::sync::atomic::{AtomicU32, Ordering};

// -------------------------------------------------------------------------------------------------

/// A lock-free `f32` cell, stored as the float's bit pattern in an [`AtomicU32`].
///
/// Loads and stores of a single value never tear. There is no ordering relation between
/// separate cells: readers may see cells updated in different audio blocks.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub const fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl From<f32> for AtomicF32 {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

// -------------------------------------------------------------------------------------------------
