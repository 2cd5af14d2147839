//! IdGenerator port.
//!
//! ULIDs built from the injected clock, so ids stay time-sortable even under a
//! test clock.
//!
//! # ULID properties
//! - 48-bit millisecond timestamp in the high bits: ids sort by creation time
//! - 80 random bits: generated on any node without coordination
//! - 128 bits in total, same width as a UUID
//!
//! Ids minted in the same millisecond compare by their random part, so
//! ordering is only guaranteed across milliseconds.

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
