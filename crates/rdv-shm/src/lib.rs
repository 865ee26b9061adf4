//! Shared-Segment Manager and Rendezvous Channel: named shared memory, a
//! name-keyed typed allocator inside it, and the two-semaphore
//! turn-taking protocol that serializes master and worker.

mod arena;
pub mod channel;
pub mod error;
pub mod platform;
pub mod record;
mod segment;

pub use channel::{RendezvousChannel, DEFAULT_OPEN_TIMEOUT};
pub use error::SegmentError;
pub use record::{
    BooleanRecord, ControlBlock, IntegerRecord, RealRecord, ScalarRecord, StringRecord, StringTooLong,
    StringValue, BOOLEAN_VECTOR_NAME, CONTROL_BLOCK_NAME, INTEGER_VECTOR_NAME, REAL_VECTOR_NAME,
    STRING_VALUE_CAPACITY, STRING_VECTOR_NAME,
};
pub use segment::SegmentManager;
