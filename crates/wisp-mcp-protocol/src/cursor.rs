//! Opaque, signed pagination cursors.
//!
//! A cursor is `base64url(offset ":" sig)` where `sig` is keyed over the
//! offset. Tampered or foreign cursors fail to decode and the caller treats
//! them as invalid params. The key is per-process random, so cursors do not
//! survive a restart; clients are expected to restart pagination from the
//! first page in that case.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::hash::{DefaultHasher, Hash, Hasher};

#[derive(Debug, Clone, Copy)]
pub struct PageCursor {
    key: u64,
}

impl PageCursor {
    pub fn new(key: u64) -> Self {
        Self { key }
    }

    fn sign(&self, offset: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.key.hash(&mut hasher);
        offset.hash(&mut hasher);
        hasher.finish()
    }

    pub fn encode(&self, offset: usize) -> String {
        let payload = format!("{}:{:016x}", offset, self.sign(offset));
        URL_SAFE_NO_PAD.encode(payload)
    }

    /// Decode and verify; `None` for malformed, tampered or foreign cursors.
    pub fn decode(&self, cursor: &str) -> Option<usize> {
        let raw = URL_SAFE_NO_PAD.decode(cursor).ok()?;
        let text = String::from_utf8(raw).ok()?;
        let (offset, sig) = text.split_once(':')?;
        let offset: usize = offset.parse().ok()?;
        let sig = u64::from_str_radix(sig, 16).ok()?;
        (sig == self.sign(offset)).then_some(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let cursor = PageCursor::new(12345);
        let encoded = cursor.encode(300);
        assert_eq!(cursor.decode(&encoded), Some(300));
    }

    #[test]
    fn test_tampered_cursor_rejected() {
        let cursor = PageCursor::new(12345);
        let encoded = cursor.encode(300);
        // Flip a character in the encoded form.
        let mut chars: Vec<char> = encoded.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert_eq!(cursor.decode(&tampered), None);
    }

    #[test]
    fn test_foreign_key_rejected() {
        let ours = PageCursor::new(1);
        let theirs = PageCursor::new(2);
        let encoded = theirs.encode(100);
        assert_eq!(ours.decode(&encoded), None);
    }

    #[test]
    fn test_garbage_rejected() {
        let cursor = PageCursor::new(7);
        assert_eq!(cursor.decode("not base64 ###"), None);
        assert_eq!(cursor.decode(""), None);
    }
}
