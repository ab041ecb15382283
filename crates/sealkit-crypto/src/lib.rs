//! sealkit-crypto: cipher material for transient session state
//!
//! A process holds exactly one `(key, iv)` pair, generated lazily on a
//! background thread, and hands out AES-128-CBC ciphers built from it. The
//! pair can be saved into a host bundle and restored after the host is paused
//! or restarted, so state sealed before the restart stays readable.
//!
//! Generation:
//! ```text
//! RandomByteSource ── 16-byte seed ──► HKDF-SHA256 ──► StdRng ──► 128-bit key
//!                  └─ 16-byte IV ───────────────────────────────► iv
//! ```
//!
//! Lifecycle of a `CipherFactory`:
//! ```text
//! Uninitialized ──trigger──► Generating ──ok──► Ready
//!       │                        └─────err────► Failed (permanent)
//!       └──────────restore──────────────────────► Ready
//! ```

pub mod cipher;
pub mod error;
pub mod factory;
pub mod material;
pub mod random;

pub use cipher::{CipherMode, SessionCipher};
pub use error::{CryptoError, CryptoResult};
pub use factory::{CipherFactory, FactoryState, RestoreOutcome, BUNDLE_IV, BUNDLE_KEY};
pub use material::{derive_material, CipherMaterial};
pub use random::{OsRandomSource, RandomByteSource};

/// Size of an AES-128 key in bytes
pub const KEY_SIZE: usize = 16;

/// Size of a CBC initialization vector (one AES block)
pub const IV_SIZE: usize = 16;

/// Size of the seed drawn from the random source for key derivation
pub const SEED_SIZE: usize = 16;

/// AES block size
pub const BLOCK_SIZE: usize = 16;
