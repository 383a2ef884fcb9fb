//! Locally unique 64-bit id generation.
//!
//! Layout of a generated id:
//!
//! ```text
//!  63                      20 19        10 9          0
//! +--------------------------+------------+------------+
//! | ms since epoch           | node id    | counter    |
//! +--------------------------+------------+------------+
//! ```
//!
//! # Invariants
//! - Ids from one generator are strictly increasing
//! - The counter never spills into the node id bits
//! - Thread-safe via a short-held mutex

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// 2025-07-22T00:00:00Z in milliseconds since the Unix epoch.
pub const DEFAULT_EPOCH_MS: i64 = 1_753_142_400_000;

const NODE_BITS: u32 = 10;
const COUNTER_BITS: u32 = 10;
const NODE_MASK: i64 = (1 << NODE_BITS) - 1;
const COUNTER_MAX: i64 = (1 << COUNTER_BITS) - 1;

/// Last issued (timestamp, counter) pair.
#[derive(Debug, Default)]
struct Sequence {
    timestamp: i64,
    counter: i64,
}

/// Timestamp + node + counter id generator.
///
/// Each node owns one generator; ids from different nodes never collide
/// because the node id occupies its own bits.
#[derive(Debug)]
pub struct IdGenerator {
    node: i64,
    epoch_ms: i64,
    last: Mutex<Option<Sequence>>,
}

impl IdGenerator {
    /// Create a generator for a numeric node id (masked to 10 bits).
    pub fn new(node: u64, epoch_ms: i64) -> Self {
        Self {
            node: node as i64 & NODE_MASK,
            epoch_ms,
            last: Mutex::new(None),
        }
    }

    /// Generate an id from the wall clock.
    pub fn next_id(&self) -> i64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        self.next_id_at(now_ms)
    }

    /// Generate an id as if the wall clock read `now_ms`.
    ///
    /// A clock that moves backwards reuses the last timestamp. A counter
    /// overflow within one millisecond advances the timestamp by one.
    pub fn next_id_at(&self, now_ms: i64) -> i64 {
        let elapsed = now_ms - self.epoch_ms;
        let mut last = self.last.lock();

        let (timestamp, counter) = match last.as_ref() {
            Some(prev) if elapsed <= prev.timestamp => {
                if prev.counter < COUNTER_MAX {
                    (prev.timestamp, prev.counter + 1)
                } else {
                    (prev.timestamp + 1, 0)
                }
            }
            _ => (elapsed, 0),
        };

        *last = Some(Sequence { timestamp, counter });

        (timestamp << (NODE_BITS + COUNTER_BITS)) | (self.node << COUNTER_BITS) | counter
    }
}

/// Split an id into (elapsed ms, node id, counter).
pub fn decompose(id: i64) -> (i64, i64, i64) {
    (
        id >> (NODE_BITS + COUNTER_BITS),
        (id >> COUNTER_BITS) & NODE_MASK,
        id & COUNTER_MAX,
    )
}
