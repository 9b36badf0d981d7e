//! Per-client publish sequence numbers.

use std::sync::atomic::{AtomicU32, Ordering};

/// Largest sequence value; the next value after it is 1.
pub const MAX_SEQUENCE: u32 = 65_535;

/// Atomic counter handing out `seqn` values in `[1, MAX_SEQUENCE]`.
///
/// Values are distinct across concurrent callers within one wrap cycle.
/// They are used for client-side correlation only; the server does not
/// order messages by them.
#[derive(Debug, Default)]
pub struct PublishSequence {
    last: AtomicU32,
}

impl PublishSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u32 {
        let prev = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(step(n)))
            .unwrap_or_else(|n| n);
        step(prev)
    }
}

fn step(n: u32) -> u32 {
    if n >= MAX_SEQUENCE { 1 } else { n + 1 }
}
