//! Client sessions: the unit that owns ordering and dedup state across
//! batches.

pub mod ordering;
pub mod registry;

pub use ordering::{ordered_file_name, sequence_of, SequenceAllocator};
pub use registry::SessionRegistry;

use crate::pipeline::dedup::DedupCache;

/// State for one logical client.
///
/// Handed out as `Arc<Session>` by the [`SessionRegistry`]. A batch keeps its
/// session alive until it finishes even if the registry expires it meanwhile.
#[derive(Debug)]
pub struct Session {
    token: String,
    sequence: SequenceAllocator,
    cache: DedupCache,
}

impl Session {
    pub(crate) fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            sequence: SequenceAllocator::new(),
            cache: DedupCache::new(),
        }
    }

    /// A session whose numbering continues after `last_sequence`.
    pub(crate) fn resumed(token: impl Into<String>, last_sequence: u64) -> Self {
        Self {
            token: token.into(),
            sequence: SequenceAllocator::starting_after(last_sequence),
            cache: DedupCache::new(),
        }
    }

    /// Opaque session identity; also the session's directory name.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Reserve the next output sequence number for this session.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.next()
    }

    /// Most recently reserved sequence number (0 if none).
    pub fn last_sequence(&self) -> u64 {
        self.sequence.last_issued()
    }

    pub(crate) fn advance_past(&self, last_sequence: u64) {
        self.sequence.advance_past(last_sequence);
    }

    /// Content-hash cache scoped to this session.
    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }
}

/// Tokens double as directory names, so only a conservative alphabet is
/// accepted.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= 128
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tokens() {
        assert!(is_valid_token("3f2c9a1e-7b4d-4c1a-9e2f-0a1b2c3d4e5f"));
        assert!(is_valid_token("cli_batch"));
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("../etc"));
        assert!(!is_valid_token("a/b"));
        assert!(!is_valid_token("with space"));
        assert!(!is_valid_token(&"x".repeat(129)));
    }

    #[test]
    fn test_session_sequence() {
        let session = Session::new("abc");
        assert_eq!(session.token(), "abc");
        assert_eq!(session.last_sequence(), 0);
        assert_eq!(session.next_sequence(), 1);
        assert_eq!(session.next_sequence(), 2);
        assert_eq!(session.last_sequence(), 2);
        assert!(session.cache().is_empty());
    }

    #[test]
    fn test_resumed_session_continues_numbering() {
        let session = Session::resumed("abc", 7);
        assert_eq!(session.last_sequence(), 7);
        assert_eq!(session.next_sequence(), 8);
    }
}
