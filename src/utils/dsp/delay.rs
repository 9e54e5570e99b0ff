//! Ring buffers to delay or look up signals.

use assume::assume;

// -------------------------------------------------------------------------------------------------

/// Fixed capacity, multi channel ring buffer with fractional, linearly interpolated reads.
///
/// The capacity does not need to be a power of two: all indices are wrapped modulo the capacity,
/// so reads never go out of bounds. Only `write` and `skip` move the write cursor.
#[derive(Debug, Clone, Default)]
pub struct CircularBuffer<const CHANNELS: usize> {
    frames: Vec<[f32; CHANNELS]>,
    write_pos: usize,
}

impl<const CHANNELS: usize> CircularBuffer<CHANNELS> {
    /// Create a new, silent ring buffer holding the given number of sample frames.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Invalid ring buffer capacity");
        Self {
            frames: vec![[0.0; CHANNELS]; capacity],
            write_pos: 0,
        }
    }

    /// Number of frames the buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Index of the slot the next `write` call will store its frame to.
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Silence all frames and move the write cursor back to the start.
    pub fn clear(&mut self) {
        self.frames.fill([0.0; CHANNELS]);
        self.write_pos = 0;
    }

    /// Copy the contents and write cursor of another buffer with the same capacity.
    pub fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.capacity(), other.capacity(), "Capacity mismatch");
        self.frames.copy_from_slice(&other.frames);
        self.write_pos = other.write_pos;
    }

    /// Store a frame at the write cursor, then advance the cursor.
    #[inline]
    pub fn write(&mut self, frame: [f32; CHANNELS]) {
        let len = self.frames.len();
        assume!(unsafe: self.write_pos < len);
        self.frames[self.write_pos] = frame;
        self.write_pos += 1;
        if self.write_pos >= len {
            self.write_pos = 0;
        }
    }

    /// Advance the write cursor by one frame, leaving the frame at the cursor as it is.
    #[inline]
    pub fn skip(&mut self) {
        self.write_pos += 1;
        if self.write_pos >= self.frames.len() {
            self.write_pos = 0;
        }
    }

    /// Mix a frame into the most recently written slot.
    #[inline]
    pub fn accumulate_last(&mut self, frame: [f32; CHANNELS]) {
        let len = self.frames.len();
        let last = if self.write_pos == 0 {
            len - 1
        } else {
            self.write_pos - 1
        };
        assume!(unsafe: last < len);
        for (sample, add) in self.frames[last].iter_mut().zip(frame) {
            *sample += add;
        }
    }

    /// Read a linearly interpolated frame `distance` frames behind the most recently written one.
    ///
    /// A distance of `0.0` returns the last written frame.
    #[inline]
    pub fn read_interpolated(&self, distance: f32) -> [f32; CHANNELS] {
        debug_assert!(distance >= 0.0, "Reads must be behind the write cursor");
        self.read_at(self.write_pos as f32 - 1.0 - distance)
    }

    /// Read a linearly interpolated frame at the given absolute, fractional position.
    ///
    /// Positions outside of the buffer's range get wrapped around.
    #[inline]
    pub fn read_at(&self, position: f32) -> [f32; CHANNELS] {
        let len = self.frames.len();
        let position = position.rem_euclid(len as f32);
        let position_floor = position.floor();
        let fraction = position - position_floor;

        // rem_euclid may round up to len for tiny negative positions
        let index0 = (position_floor as usize) % len;
        let index1 = if index0 + 1 >= len { 0 } else { index0 + 1 };

        assume!(unsafe: index0 < len);
        let frame0 = self.frames[index0];
        assume!(unsafe: index1 < len);
        let frame1 = self.frames[index1];

        let mut output = [0.0; CHANNELS];
        for ((out, s0), s1) in output.iter_mut().zip(frame0).zip(frame1) {
            *out = s0 + (s1 - s0) * fraction;
        }
        output
    }

    /// Access the raw frames, for inspection and snapshots.
    pub fn frames(&self) -> &[[f32; CHANNELS]] {
        &self.frames
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_last_written() {
        let mut buffer = CircularBuffer::<2>::new(7);
        for i in 0..50 {
            let frame = [i as f32, -(i as f32)];
            buffer.write(frame);
            assert_eq!(buffer.read_interpolated(0.0), frame);
        }
    }

    #[test]
    fn interpolated_reads_wrap() {
        let mut buffer = CircularBuffer::<1>::new(5);
        for i in 1..=7 {
            buffer.write([i as f32]);
        }
        // holds [6, 7, 3, 4, 5], cursor at index 2
        assert_eq!(buffer.write_pos(), 2);
        assert_eq!(buffer.read_interpolated(1.0), [6.0]);
        assert_eq!(buffer.read_interpolated(2.0), [5.0]);
        assert_eq!(buffer.read_interpolated(1.5), [5.5]);
        // between the last and the first slot
        assert_eq!(buffer.read_at(4.5), [5.5]);
        assert_eq!(buffer.read_at(-0.5), [5.5]);
        assert_eq!(buffer.read_at(5.0), [6.0]);
        assert_eq!(buffer.read_at(-1e-9), [6.0]);
    }

    #[test]
    fn accumulate_and_clear() {
        let mut buffer = CircularBuffer::<2>::new(3);
        buffer.write([1.0, 2.0]);
        buffer.accumulate_last([0.5, 0.5]);
        assert_eq!(buffer.read_interpolated(0.0), [1.5, 2.5]);
        buffer.write([0.0, 0.0]);
        buffer.write([0.0, 0.0]);
        buffer.accumulate_last([1.0, 1.0]);
        assert_eq!(buffer.frames()[2], [1.0, 1.0]);

        let mut copy = CircularBuffer::<2>::new(3);
        copy.copy_from(&buffer);
        assert_eq!(copy.frames(), buffer.frames());
        assert_eq!(copy.write_pos(), 0);

        buffer.clear();
        assert!(buffer.frames().iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(buffer.write_pos(), 0);
    }

    #[test]
    fn skip_keeps_frames() {
        let mut buffer = CircularBuffer::<1>::new(3);
        buffer.write([1.0]);
        buffer.write([2.0]);
        buffer.skip();
        assert_eq!(buffer.write_pos(), 0);
        assert_eq!(buffer.frames(), &[[1.0], [2.0], [0.0]]);
        buffer.skip();
        buffer.write([4.0]);
        assert_eq!(buffer.frames(), &[[1.0], [4.0], [0.0]]);
        assert_eq!(buffer.read_interpolated(1.0), [1.0]);
    }
}
