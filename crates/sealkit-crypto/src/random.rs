//! Sources of cryptographically strong random bytes

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Supplies secure random byte sequences.
///
/// Implementations must return exactly `len` bytes or fail; a short read is
/// an error, never a shorter vector.
pub trait RandomByteSource: Send + Sync {
    fn get_bytes(&self, len: usize) -> CryptoResult<Vec<u8>>;
}

/// The operating system CSPRNG (`getrandom` / `/dev/urandom`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandomSource;

impl RandomByteSource for OsRandomSource {
    fn get_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_source_returns_requested_length() {
        let source = OsRandomSource;
        assert_eq!(source.get_bytes(0).unwrap().len(), 0);
        assert_eq!(source.get_bytes(16).unwrap().len(), 16);
        assert_eq!(source.get_bytes(1000).unwrap().len(), 1000);
    }

    #[test]
    fn test_os_source_draws_differ() {
        let source = OsRandomSource;
        let a = source.get_bytes(32).unwrap();
        let b = source.get_bytes(32).unwrap();
        assert_ne!(a, b, "two 256-bit draws must differ");
    }
}
