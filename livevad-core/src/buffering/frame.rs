//! Fixed-length framing of an arbitrarily chunked sample stream.
//!
//! `FrameBuffer::push` appends a chunk and returns a lazy iterator over every
//! frame that is now complete. Leftover samples stay buffered for the next
//! push. Frames the caller does not pull from the iterator are not lost either:
//! they are yielded again by the next `push`.

/// A contiguous window of exactly `frame_len` mono f32 samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Zero-based position of this frame in the stream.
    pub index: u64,
}

impl Frame {
    pub fn new(samples: Vec<f32>, index: u64) -> Self {
        Self { samples, index }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accumulates samples and cuts them into frames of a fixed length.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    frame_len: usize,
    pending: Vec<f32>,
    /// Start of the not-yet-emitted region of `pending`.
    head: usize,
    emitted: u64,
}

impl FrameBuffer {
    /// `frame_len` is clamped to at least one sample; callers validate it first.
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            pending: Vec::new(),
            head: 0,
            emitted: 0,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Samples buffered but not yet emitted as part of a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len() - self.head
    }

    /// Number of frames emitted since construction or the last reset.
    pub fn frames_emitted(&self) -> u64 {
        self.emitted
    }

    /// Append `chunk` and iterate the frames that are complete.
    pub fn push<'a>(&'a mut self, chunk: &[f32]) -> Frames<'a> {
        self.compact();
        self.pending.extend_from_slice(chunk);
        Frames { buffer: self }
    }

    /// Drop buffered samples and restart frame numbering.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.head = 0;
        self.emitted = 0;
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if self.pending_len() < self.frame_len {
            return None;
        }
        let end = self.head + self.frame_len;
        let samples = self.pending[self.head..end].to_vec();
        self.head = end;
        let index = self.emitted;
        self.emitted += 1;
        Some(Frame::new(samples, index))
    }

    fn compact(&mut self) {
        if self.head > 0 {
            self.pending.drain(..self.head);
            self.head = 0;
        }
    }
}

/// Lazy iterator returned by [`FrameBuffer::push`].
#[derive(Debug)]
pub struct Frames<'a> {
    buffer: &'a mut FrameBuffer,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.buffer.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.buffer.pending_len() / self.buffer.frame_len;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Frames<'_> {}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        self.buffer.compact();
    }
}
