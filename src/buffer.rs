/*
    trackfile

    --------------------------------------------------------------------------

    src/buffer.rs

    Allocates per-unit track buffers aligned to a 16-byte boundary.
    Real trackfile.device asks the host filesystem's mount descriptor which
    memory flags to allocate with; this crate has no host filesystem to ask,
    so `TrackBuffer::new` takes the alignment-preference hint directly and
    the admission path (src/admission.rs) is the only caller that resolves it.
*/

use bytemuck::{Pod, Zeroable};

pub const BUFFER_ALIGNMENT: usize = 16;

/// An over-allocated, 16-byte-aligned byte buffer sized to hold exactly one
/// track's worth of data for whichever geometry the owning unit is using.
///
/// Alignment is achieved by allocating from a `Vec<AlignedChunk>` and slicing
/// back down to the requested length, the same "allocate typed, expose
/// bytes" trick `bytemuck` exists to make sound.
#[derive(Debug, Clone)]
pub struct TrackBuffer {
    chunks: Vec<AlignedChunk>,
    len: usize,
}

#[derive(Copy, Clone, Pod, Zeroable)]
#[repr(C, align(16))]
struct AlignedChunk([u8; BUFFER_ALIGNMENT]);

impl TrackBuffer {
    /// Allocate a zeroed buffer capable of holding `len` bytes of track data.
    pub fn new(len: usize) -> Self {
        let chunk_count = len.div_ceil(BUFFER_ALIGNMENT);
        Self {
            chunks: vec![AlignedChunk([0; BUFFER_ALIGNMENT]); chunk_count],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.chunks)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.chunks)[..self.len]
    }

    /// Overlay `data` into the buffer starting at `offset`, as the write path
    /// does when a write doesn't span a whole track.
    pub fn overlay(&mut self, offset: usize, data: &[u8]) {
        self.as_mut_slice()[offset..offset + data.len()].copy_from_slice(data);
    }

    /// True address of the backing storage, for asserting alignment in tests.
    pub fn addr(&self) -> usize {
        self.chunks.as_ptr() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_aligned() {
        let buf = TrackBuffer::new(11 * 512);
        assert_eq!(buf.addr() % BUFFER_ALIGNMENT, 0);
        assert_eq!(buf.len(), 11 * 512);
    }

    #[test]
    fn buffer_is_zeroed_on_creation() {
        let buf = TrackBuffer::new(64);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn overlay_writes_in_place() {
        let mut buf = TrackBuffer::new(16);
        buf.overlay(4, &[1, 2, 3]);
        assert_eq!(&buf.as_slice()[4..7], &[1, 2, 3]);
    }
}
