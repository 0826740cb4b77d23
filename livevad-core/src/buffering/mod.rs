//! Sample buffering.
//!
//! - [`frame`]: cuts an arbitrarily chunked stream into fixed-length frames.
//! - The SPSC ring below hands samples from a real-time audio callback to the
//!   capture reader. `ringbuf::HeapRb<f32>` gives a wait-free `push_slice`
//!   that is safe to call from the callback.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use frame::{Frame, FrameBuffer, Frames};
pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the audio callback thread.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the capture reader.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^18 = 262 144 f32 samples ≈ 5.4 s at 48 kHz.
/// The reader drains every few milliseconds, so this only absorbs scheduling hiccups.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_sample_ring() -> (SampleProducer, SampleConsumer) {
    create_sample_ring_with_capacity(RING_CAPACITY)
}

pub fn create_sample_ring_with_capacity(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(capacity.max(1)).split()
}
