//! Snowflake-style id generation.
//!
//! Ids are 63-bit positive integers laid out as
//! `| 41 bits ms since EPOCH | 10 bits worker | 12 bits sequence |`,
//! so ids minted by one worker are strictly increasing and ids from
//! different workers never collide.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch (2024-01-01T00:00:00Z) in Unix milliseconds.
pub const EPOCH_MS: i64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

/// Source of unique 64-bit ids for persisted rows.
pub trait IdGenerator: Send + Sync {
    /// Returns the next id. Never returns the same value twice.
    fn next_id(&self) -> i64;
}

/// Error returned when constructing a generator with an invalid worker id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidWorkerId(pub u16);

impl std::fmt::Display for InvalidWorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "worker id {} exceeds the maximum of {MAX_WORKER_ID}",
            self.0
        )
    }
}

impl std::error::Error for InvalidWorkerId {}

#[derive(Debug, Default)]
struct State {
    last_ms: i64,
    sequence: i64,
}

/// Thread-safe snowflake generator for a single worker.
#[derive(Debug)]
pub struct SnowflakeGenerator {
    worker_id: i64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    /// Creates a generator for the given worker (0..=1023).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWorkerId`] if `worker_id` does not fit in 10 bits.
    pub fn new(worker_id: u16) -> Result<Self, InvalidWorkerId> {
        if worker_id > MAX_WORKER_ID {
            return Err(InvalidWorkerId(worker_id));
        }
        Ok(Self {
            worker_id: i64::from(worker_id),
            state: Mutex::new(State::default()),
        })
    }

    /// Returns the worker id baked into every generated id.
    #[must_use]
    pub fn worker_id(&self) -> u16 {
        // Bounded by MAX_WORKER_ID at construction.
        self.worker_id as u16
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            - EPOCH_MS
    }
}

impl IdGenerator for SnowflakeGenerator {
    fn next_id(&self) -> i64 {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // A clock step backwards keeps using the last timestamp.
        let mut now = Self::now_ms().max(state.last_ms);
        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; borrow the next one.
                now += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        (now << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | state.sequence
    }
}

/// Extracts the Unix millisecond timestamp encoded in a snowflake id.
#[must_use]
pub fn timestamp_ms(id: i64) -> i64 {
    (id >> (WORKER_BITS + SEQUENCE_BITS)) + EPOCH_MS
}
