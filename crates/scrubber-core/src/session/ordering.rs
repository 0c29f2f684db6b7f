//! Per-session sequence numbers and the ordered output file names built
//! from them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing sequence numbers for one session.
///
/// Numbers are never handed back. A job that reserves a number and then
/// fails leaves a gap; reuse would let two in-flight jobs end up with the
/// same number.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    last: AtomicU64,
}

impl SequenceAllocator {
    /// Create an allocator whose first issued number is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that continues after `last` (first issued is `last + 1`).
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    /// Reserve the next sequence number.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The most recently issued number (0 if none).
    pub fn last_issued(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }

    /// Make sure every later number is above `last`. Never moves backwards.
    pub fn advance_past(&self, last: u64) {
        self.last.fetch_max(last, Ordering::SeqCst);
    }
}

/// Build `{sequence:06}_{8 hex chars}{extension}`.
///
/// The random part keeps names unique when the same sequence number is
/// issued by two different sessions into a shared export directory.
pub fn ordered_file_name(sequence: u64, extension: &str) -> String {
    let disambiguator: u32 = rand::random();
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!("{sequence:06}_{disambiguator:08x}")
    } else {
        format!("{sequence:06}_{disambiguator:08x}.{extension}")
    }
}

/// Sequence number encoded in an ordered file name.
pub fn sequence_of(file_name: &str) -> Option<u64> {
    let (digits, _) = file_name.split_once('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
