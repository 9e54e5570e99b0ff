//! Helpers to view and convert interleaved and planar audio buffers.

// -------------------------------------------------------------------------------------------------

/// Channel/frame views of an interleaved, mutable `f32` sample buffer.
pub trait InterleavedBufferMut {
    /// View the buffer as a slice of fixed sized frames with `CHANNELS` samples each.
    ///
    /// Trailing samples, which do not fill up a full frame, are not included.
    fn as_frames_mut<const CHANNELS: usize>(&mut self) -> &mut [[f32; CHANNELS]];

    /// Iterate over frames with a dynamic channel count.
    fn frames_mut(&mut self, channel_count: usize) -> std::slice::ChunksExactMut<'_, f32>;
}

impl InterleavedBufferMut for [f32] {
    #[inline]
    fn as_frames_mut<const CHANNELS: usize>(&mut self) -> &mut [[f32; CHANNELS]] {
        let (frames, remainder) = self.as_chunks_mut::<CHANNELS>();
        debug_assert!(
            remainder.is_empty(),
            "Buffer length is not a multiple of the channel count"
        );
        frames
    }

    #[inline]
    fn frames_mut(&mut self, channel_count: usize) -> std::slice::ChunksExactMut<'_, f32> {
        debug_assert!(channel_count > 0, "Invalid channel count");
        self.chunks_exact_mut(channel_count)
    }
}

// -------------------------------------------------------------------------------------------------

/// Copy a planar stereo buffer pair into an interleaved buffer.
/// The interleaved buffer must be large enough to hold all planar frames.
pub fn stereo_planar_to_interleaved(left: &[f32], right: &[f32], interleaved: &mut [f32]) {
    debug_assert_eq!(left.len(), right.len(), "Planar channel sizes mismatch");
    debug_assert!(interleaved.len() >= left.len() * 2, "Interleaved buffer too small");
    for (frame, (l, r)) in interleaved
        .as_frames_mut::<2>()
        .iter_mut()
        .zip(left.iter().zip(right))
    {
        frame[0] = *l;
        frame[1] = *r;
    }
}

/// Copy an interleaved stereo buffer into a planar stereo buffer pair.
pub fn stereo_interleaved_to_planar(interleaved: &[f32], left: &mut [f32], right: &mut [f32]) {
    debug_assert_eq!(left.len(), right.len(), "Planar channel sizes mismatch");
    for (frame, (l, r)) in interleaved
        .chunks_exact(2)
        .zip(left.iter_mut().zip(right.iter_mut()))
    {
        *l = frame[0];
        *r = frame[1];
    }
}

// -------------------------------------------------------------------------------------------------

/// Absolute peak value of all samples in the given buffer.
pub fn max_abs_sample(buffer: &[f32]) -> f32 {
    buffer.iter().fold(0.0f32, |max, &val| max.max(val.abs()))
}

// -------------------------------------------------------------------------------------------------
