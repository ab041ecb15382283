//! Streaming AES-128-CBC with PKCS#7 padding
//!
//! Callers feed data through `update` and finish with `finalize`:
//! - encrypt: `update` emits every complete block; `finalize` pads the tail.
//! - decrypt: `update` holds back the last complete block, since only
//!   `finalize` can tell whether it carries the padding.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::{CryptoError, CryptoResult};
use crate::material::CipherMaterial;
use crate::BLOCK_SIZE;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Encrypt,
    Decrypt,
}

enum Engine {
    Encrypt(Aes128CbcEnc),
    Decrypt(Aes128CbcDec),
}

/// A single-use cipher stream bound to one key/IV pair.
pub struct SessionCipher {
    engine: Engine,
    pending: Vec<u8>,
}

impl SessionCipher {
    pub fn new(material: &CipherMaterial, mode: CipherMode) -> CryptoResult<Self> {
        let engine = match mode {
            CipherMode::Encrypt => Engine::Encrypt(
                Aes128CbcEnc::new_from_slices(material.key(), material.iv())
                    .map_err(|e| CryptoError::AlgorithmUnavailable(format!("AES-128-CBC: {e}")))?,
            ),
            CipherMode::Decrypt => Engine::Decrypt(
                Aes128CbcDec::new_from_slices(material.key(), material.iv())
                    .map_err(|e| CryptoError::AlgorithmUnavailable(format!("AES-128-CBC: {e}")))?,
            ),
        };
        Ok(Self {
            engine,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    pub fn mode(&self) -> CipherMode {
        match self.engine {
            Engine::Encrypt(_) => CipherMode::Encrypt,
            Engine::Decrypt(_) => CipherMode::Decrypt,
        }
    }

    /// Feed `input` and return whatever output is ready.
    pub fn update(&mut self, input: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(input);

        let mut ready = self.pending.len() / BLOCK_SIZE * BLOCK_SIZE;
        if matches!(self.engine, Engine::Decrypt(_)) && ready == self.pending.len() && ready > 0 {
            ready -= BLOCK_SIZE;
        }

        let mut out: Vec<u8> = self.pending.drain(..ready).collect();
        for chunk in out.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match &mut self.engine {
                Engine::Encrypt(enc) => enc.encrypt_block_mut(block),
                Engine::Decrypt(dec) => dec.decrypt_block_mut(block),
            }
        }
        out
    }

    /// Finish the stream: pad and emit the last block (encrypt), or decrypt
    /// the held-back block and strip its padding (decrypt).
    pub fn finalize(self) -> CryptoResult<Vec<u8>> {
        match self.engine {
            Engine::Encrypt(enc) => Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(&self.pending)),
            Engine::Decrypt(dec) => {
                if self.pending.len() != BLOCK_SIZE {
                    return Err(CryptoError::InvalidCiphertext(format!(
                        "expected one final {BLOCK_SIZE}-byte block, have {} bytes",
                        self.pending.len()
                    )));
                }
                dec.decrypt_padded_vec_mut::<Pkcs7>(&self.pending)
                    .map_err(|_| CryptoError::InvalidCiphertext("bad padding".into()))
            }
        }
    }

    /// Run a whole buffer through the cipher.
    pub fn process(mut self, input: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut out = self.update(input);
        out.extend(self.finalize()?);
        Ok(out)
    }
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher")
            .field("mode", &self.mode())
            .field("pending", &self.pending.len())
            .finish()
    }
}
