//! Cipher material: the AES-128 key and CBC IV, and how they are generated

use hkdf::Hkdf;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::random::RandomByteSource;
use crate::{IV_SIZE, KEY_SIZE, SEED_SIZE};

/// HKDF info label for stretching the drawn seed into a PRNG seed
const PRNG_SEED_INFO: &[u8] = b"sealkit-keygen-prng";

/// An AES-128 key plus CBC IV. Immutable once built; zeroized on drop.
pub struct CipherMaterial {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl CipherMaterial {
    pub fn from_bytes(key: [u8; KEY_SIZE], iv: [u8; IV_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Build material from untrusted slices, e.g. bundle entries.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> CryptoResult<Self> {
        let key: [u8; KEY_SIZE] = key.try_into().map_err(|_| {
            CryptoError::MalformedMaterial(format!(
                "key is {} bytes (expected {KEY_SIZE})",
                key.len()
            ))
        })?;
        let iv: [u8; IV_SIZE] = iv.try_into().map_err(|_| {
            CryptoError::MalformedMaterial(format!(
                "iv is {} bytes (expected {IV_SIZE})",
                iv.len()
            ))
        })?;
        Ok(Self { key, iv })
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Constant-time comparison of both key and IV.
    pub fn matches(&self, other: &CipherMaterial) -> bool {
        let same = self.key[..].ct_eq(&other.key[..]) & self.iv[..].ct_eq(&other.iv[..]);
        same.into()
    }

    /// Short BLAKE3 fingerprint over key || iv, safe to log.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.key);
        hasher.update(&self.iv);
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

impl Drop for CipherMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl std::fmt::Debug for CipherMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherMaterial")
            .field("key", &"[REDACTED]")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Generate fresh material from `source`.
///
/// Draws a seed and an IV, then derives the key from a PRNG seeded with the
/// drawn seed. Any failure yields an error and no material.
pub fn derive_material(source: &dyn RandomByteSource) -> CryptoResult<CipherMaterial> {
    let mut seed = draw(source, SEED_SIZE)?;
    let iv = draw(source, IV_SIZE)?;

    let key = derive_key_from_seed(&seed);
    seed.zeroize();

    let mut material_iv = [0u8; IV_SIZE];
    material_iv.copy_from_slice(&iv);
    Ok(CipherMaterial::from_bytes(key?, material_iv))
}

fn draw(source: &dyn RandomByteSource, len: usize) -> CryptoResult<Vec<u8>> {
    let bytes = source.get_bytes(len)?;
    if bytes.len() != len {
        return Err(CryptoError::EntropyUnavailable(format!(
            "random source returned {} bytes (requested {len})",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Derive the 128-bit key from a seed: HKDF-SHA256 stretches the seed to a
/// 256-bit `StdRng` seed, and the key is drawn from that generator.
fn derive_key_from_seed(seed: &[u8]) -> CryptoResult<[u8; KEY_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);
    let mut prng_seed = [0u8; 32];
    hkdf.expand(PRNG_SEED_INFO, &mut prng_seed)
        .map_err(|e| CryptoError::AlgorithmUnavailable(format!("HKDF expand failed: {e}")))?;

    let mut rng = StdRng::from_seed(prng_seed);
    prng_seed.zeroize();

    let mut key = [0u8; KEY_SIZE];
    rng.fill_bytes(&mut key);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::OsRandomSource;

    struct FixedSource(u8);

    impl RandomByteSource for FixedSource {
        fn get_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
            Ok(vec![self.0; len])
        }
    }

    struct ShortSource;

    impl RandomByteSource for ShortSource {
        fn get_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
            Ok(vec![0u8; len / 2])
        }
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let k1 = derive_key_from_seed(&[7u8; SEED_SIZE]).unwrap();
        let k2 = derive_key_from_seed(&[7u8; SEED_SIZE]).unwrap();
        assert_eq!(k1, k2, "same seed must derive the same key");
    }

    #[test]
    fn test_key_derivation_different_seeds() {
        let k1 = derive_key_from_seed(&[1u8; SEED_SIZE]).unwrap();
        let k2 = derive_key_from_seed(&[2u8; SEED_SIZE]).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_key_is_not_the_seed() {
        let seed = [9u8; SEED_SIZE];
        let key = derive_key_from_seed(&seed).unwrap();
        assert_ne!(&key[..], &seed[..]);
    }

    #[test]
    fn test_derive_material_uses_drawn_iv() {
        let material = derive_material(&FixedSource(0x5A)).unwrap();
        assert_eq!(material.iv(), &[0x5A; IV_SIZE]);
        assert_eq!(
            material.key(),
            &derive_key_from_seed(&[0x5A; SEED_SIZE]).unwrap()
        );
    }

    #[test]
    fn test_derive_material_short_read_fails() {
        let err = derive_material(&ShortSource).unwrap_err();
        assert!(matches!(err, CryptoError::EntropyUnavailable(_)));
    }

    #[test]
    fn test_os_material_differs() {
        let a = derive_material(&OsRandomSource).unwrap();
        let b = derive_material(&OsRandomSource).unwrap();
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_from_slices_rejects_wrong_lengths() {
        assert!(CipherMaterial::from_slices(&[0u8; 15], &[0u8; IV_SIZE]).is_err());
        assert!(CipherMaterial::from_slices(&[0u8; 32], &[0u8; IV_SIZE]).is_err());
        assert!(CipherMaterial::from_slices(&[0u8; KEY_SIZE], &[]).is_err());
        assert!(CipherMaterial::from_slices(&[0u8; KEY_SIZE], &[0u8; IV_SIZE]).is_ok());
    }

    #[test]
    fn test_matches_compares_key_and_iv() {
        let base = CipherMaterial::from_bytes([1u8; KEY_SIZE], [2u8; IV_SIZE]);
        let same = CipherMaterial::from_bytes([1u8; KEY_SIZE], [2u8; IV_SIZE]);
        let other_key = CipherMaterial::from_bytes([3u8; KEY_SIZE], [2u8; IV_SIZE]);
        let other_iv = CipherMaterial::from_bytes([1u8; KEY_SIZE], [3u8; IV_SIZE]);

        assert!(base.matches(&same));
        assert!(!base.matches(&other_key));
        assert!(!base.matches(&other_iv));
    }

    #[test]
    fn test_debug_redacts_key() {
        let material = CipherMaterial::from_bytes([0xEEu8; KEY_SIZE], [0u8; IV_SIZE]);
        let rendered = format!("{material:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("238, 238"), "raw key bytes must not be printed");
    }
}
