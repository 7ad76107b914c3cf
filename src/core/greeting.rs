// The shared greeting buffer: name overwrite and cursor-driven reads.
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::transfer::{Sink, Source};

pub const PREFIX: &[u8] = b"Hello, ";
pub const PREFIX_LEN: usize = PREFIX.len();
pub const MAX_NAME_LEN: usize = 100;
pub const GREETING_CAPACITY: usize = PREFIX_LEN + MAX_NAME_LEN + 1;

const INITIAL_GREETING: &[u8] = b"Hello, World!";
const TERMINATOR: u8 = b'!';

#[derive(Debug)]
struct GreetingState {
    buffer: [u8; GREETING_CAPACITY],
    length: usize,
}

/// The single greeting buffer shared by every session of a device.
///
/// Each operation holds one mutex for its whole duration, so a single call
/// never sees a half-written greeting. Across calls nothing is pinned: a
/// reader continues from its own cursor against whatever the buffer holds
/// now, and a shorter greeting ends its stream early.
#[derive(Debug)]
pub struct GreetingStore {
    state: Mutex<GreetingState>,
}

impl GreetingStore {
    pub fn new() -> Self {
        let mut buffer = [0u8; GREETING_CAPACITY];
        buffer[..INITIAL_GREETING.len()].copy_from_slice(INITIAL_GREETING);
        Self {
            state: Mutex::new(GreetingState {
                buffer,
                length: INITIAL_GREETING.len(),
            }),
        }
    }

    /// Replaces the name with a prefix of `input` of at most
    /// [`MAX_NAME_LEN`] bytes and returns the name bytes actually copied.
    pub fn write<S: Source + ?Sized>(&self, input: &S) -> usize {
        let requested = input.len().min(MAX_NAME_LEN);
        let mut state = self.lock();

        state.buffer[PREFIX_LEN..].fill(0);
        let copied = input
            .copy_into(&mut state.buffer[PREFIX_LEN..PREFIX_LEN + requested])
            .min(requested);
        state.buffer[PREFIX_LEN + copied] = TERMINATOR;
        state.length = PREFIX_LEN + copied + 1;
        drop(state);

        if input.len() > MAX_NAME_LEN {
            tracing::debug!(offered = input.len(), kept = MAX_NAME_LEN, "name truncated");
        }
        if copied < requested {
            tracing::debug!(requested, copied, "partial name copy");
        }
        copied
    }

    /// Streams greeting bytes starting at `cursor` into `sink`, advancing
    /// `cursor` by the count delivered.
    ///
    /// The offer is capped by the total greeting length, not by what is left
    /// after `cursor`; the copy itself never runs past `length`.
    pub fn read<K: Sink + ?Sized>(&self, cursor: &mut u64, want: usize, sink: &mut K) -> usize {
        let state = self.lock();
        let length = state.length;
        let start = match usize::try_from(*cursor) {
            Ok(start) if start < length => start,
            _ => return 0,
        };

        let offered = want.min(length);
        let end = start + offered.min(length - start);
        let delivered = sink.accept(&state.buffer[start..end]).min(end - start);
        *cursor += delivered as u64;
        delivered
    }

    /// Current logical greeting length.
    pub fn len(&self) -> usize {
        self.lock().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current greeting bytes.
    pub fn snapshot(&self) -> Vec<u8> {
        let state = self.lock();
        state.buffer[..state.length].to_vec()
    }

    fn lock(&self) -> MutexGuard<'_, GreetingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for GreetingStore {
    fn default() -> Self {
        Self::new()
    }
}
