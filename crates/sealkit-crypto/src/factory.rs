//! Process-wide cipher material: lazy background generation, cipher hand-out,
//! and bundle save/restore.
//!
//! The factory owns a single material slot. It is written at most once, by
//! whichever comes first: the background generation job or a restore from a
//! bundle. Every later writer only compares against it.
//!
//! `get_cipher` is the only blocking call. Waiters park on a condition
//! variable that is broadcast when the generation job finishes (or when a
//! restore fills the slot first), so all of them observe the same result.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use sealkit_core::config::CryptoConfig;
use sealkit_core::StateBundle;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

use crate::cipher::{CipherMode, SessionCipher};
use crate::material::{derive_material, CipherMaterial};
use crate::random::{OsRandomSource, RandomByteSource};

/// Bundle entry holding the raw key bytes
pub const BUNDLE_KEY: &str = "sealkit.crypto.CipherFactory.KEY";

/// Bundle entry holding the IV bytes
pub const BUNDLE_IV: &str = "sealkit.crypto.CipherFactory.IV";

const DEFAULT_WORKER_NAME: &str = "sealkit-keygen";

/// Observable lifecycle of the material slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    /// No material, no generation started
    Uninitialized,
    /// Background generation in flight
    Generating,
    /// Material available (generated or restored)
    Ready,
    /// Generation failed; no retry for the lifetime of this factory
    Failed,
}

/// Result of `CipherFactory::restore_from_bundle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The bundle's material was adopted into the empty slot.
    Restored,
    /// The bundle holds exactly the material already in use.
    AlreadyConsistent,
    /// No bundle, missing entries, or malformed entries. Nothing changed.
    NotRestored,
    /// The bundle conflicts with the material in use, which was kept.
    Rejected,
}

impl RestoreOutcome {
    /// True when the factory now uses the bundle's material.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Restored | Self::AlreadyConsistent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generation {
    Idle,
    Running,
    Done,
}

struct Slot {
    material: Option<Arc<CipherMaterial>>,
    generation: Generation,
}

struct Shared {
    slot: Mutex<Slot>,
    settled: Condvar,
    source: Arc<dyn RandomByteSource>,
    worker_name: String,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of the background job. Never panics past this frame: a panicking
    /// random source counts as a failed generation.
    fn run_generation(&self) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| derive_material(self.source.as_ref())));

        let mut slot = self.lock();
        match result {
            Ok(Ok(material)) => {
                if slot.material.is_none() {
                    debug!(fingerprint = %material.fingerprint(), "cipher material generated");
                    slot.material = Some(Arc::new(material));
                } else {
                    debug!("cipher material restored during generation, discarding generated material");
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "cipher material generation failed");
            }
            Err(_) => {
                error!("cipher material generation panicked");
            }
        }
        slot.generation = Generation::Done;
        drop(slot);

        self.settled.notify_all();
    }
}

/// Hands out AES-128-CBC ciphers that all share one lazily generated key/IV.
///
/// Cloning yields another handle to the same material; construct one factory
/// at the composition root and pass clones to whoever needs ciphers.
#[derive(Clone)]
pub struct CipherFactory {
    shared: Arc<Shared>,
}

impl CipherFactory {
    /// Factory backed by the operating system CSPRNG.
    pub fn new() -> Self {
        Self::with_source(Arc::new(OsRandomSource))
    }

    /// Factory drawing its randomness from `source`.
    pub fn with_source(source: Arc<dyn RandomByteSource>) -> Self {
        Self::with_source_and_worker_name(source, DEFAULT_WORKER_NAME)
    }

    pub fn with_source_and_worker_name(
        source: Arc<dyn RandomByteSource>,
        worker_name: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    material: None,
                    generation: Generation::Idle,
                }),
                settled: Condvar::new(),
                source,
                worker_name: worker_name.into(),
            }),
        }
    }

    /// Build from configuration. Nothing is generated yet: restore any saved
    /// session first, then call `start_eager` to honour `eager_generation`.
    pub fn from_config(config: &CryptoConfig) -> Self {
        Self::with_source_and_worker_name(Arc::new(OsRandomSource), &config.worker_thread_name)
    }

    /// Trigger generation if `eager_generation` is set. A no-op once material
    /// exists, so it is safe after a successful restore.
    pub fn start_eager(&self, config: &CryptoConfig) {
        if config.eager_generation {
            self.trigger_generation();
        }
    }

    /// Block until no generation job is running. Returns immediately if none
    /// was ever started.
    pub fn wait_for_generation(&self) -> FactoryState {
        let slot = self
            .shared
            .settled
            .wait_while(self.shared.lock(), |s| s.generation == Generation::Running)
            .unwrap_or_else(PoisonError::into_inner);
        drop(slot);
        self.state()
    }

    /// Start generating material on a background thread, unless material
    /// already exists or a generation has already been started. Never blocks
    /// on the generation itself.
    pub fn trigger_generation(&self) {
        let mut slot = self.shared.lock();
        self.start_generation_locked(&mut slot);
    }

    fn start_generation_locked(&self, slot: &mut Slot) {
        if slot.material.is_some() || slot.generation != Generation::Idle {
            return;
        }
        slot.generation = Generation::Running;

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name(self.shared.worker_name.clone())
            .spawn(move || shared.run_generation());

        match spawned {
            Ok(_) => debug!(worker = %self.shared.worker_name, "cipher material generation started"),
            Err(e) => {
                error!(error = %e, "could not spawn cipher material worker");
                slot.generation = Generation::Done;
                self.shared.settled.notify_all();
            }
        }
    }

    /// Return a cipher configured with the factory's material.
    ///
    /// Blocks until the material exists, starting generation if nobody has
    /// yet. Returns `None` if generation failed; callers should then skip
    /// persisting sensitive state.
    pub fn get_cipher(&self, mode: CipherMode) -> Option<SessionCipher> {
        let material = self.wait_for_material()?;
        match SessionCipher::new(&material, mode) {
            Ok(cipher) => Some(cipher),
            Err(e) => {
                error!(error = %e, "error in creating cipher instance");
                None
            }
        }
    }

    fn wait_for_material(&self) -> Option<Arc<CipherMaterial>> {
        let mut slot = self.shared.lock();
        if slot.material.is_none() {
            self.start_generation_locked(&mut slot);
        }

        let slot = self
            .shared
            .settled
            .wait_while(slot, |s| {
                s.material.is_none() && s.generation == Generation::Running
            })
            .unwrap_or_else(PoisonError::into_inner);

        if slot.material.is_none() {
            error!("no cipher material available");
        }
        slot.material.clone()
    }

    /// The published material, if any. Never blocks on generation and never
    /// starts it.
    pub fn material(&self) -> Option<Arc<CipherMaterial>> {
        self.shared.lock().material.clone()
    }

    pub fn state(&self) -> FactoryState {
        let slot = self.shared.lock();
        match (&slot.material, slot.generation) {
            (Some(_), _) => FactoryState::Ready,
            (None, Generation::Idle) => FactoryState::Uninitialized,
            (None, Generation::Running) => FactoryState::Generating,
            (None, Generation::Done) => FactoryState::Failed,
        }
    }

    /// Write the key and IV into `bundle` if material exists. Does nothing
    /// otherwise. Returns whether anything was written.
    pub fn save_to_bundle<B: StateBundle + ?Sized>(&self, bundle: &mut B) -> bool {
        let Some(material) = self.material() else {
            debug!("no cipher material yet, nothing saved to bundle");
            return false;
        };

        bundle.put_bytes(BUNDLE_KEY, material.key().to_vec());
        bundle.put_bytes(BUNDLE_IV, material.iv().to_vec());
        true
    }

    /// Adopt the key and IV saved in `bundle`.
    ///
    /// `None` stands for "no saved state" (e.g. the session was ended
    /// explicitly). The material already in use is never replaced: a bundle
    /// that disagrees with it is rejected.
    pub fn restore_from_bundle<B: StateBundle + ?Sized>(&self, bundle: Option<&B>) -> RestoreOutcome {
        let Some(bundle) = bundle else {
            return RestoreOutcome::NotRestored;
        };
        let (mut key, mut iv) = match (bundle.get_bytes(BUNDLE_KEY), bundle.get_bytes(BUNDLE_IV)) {
            (Some(key), Some(iv)) => (key, iv),
            (partial_key, partial_iv) => {
                for mut bytes in partial_key.into_iter().chain(partial_iv) {
                    bytes.zeroize();
                }
                debug!("bundle lacks the cipher key or IV, nothing restored");
                return RestoreOutcome::NotRestored;
            }
        };

        let parsed = CipherMaterial::from_slices(&key, &iv);
        key.zeroize();
        iv.zeroize();
        let bundled = match parsed {
            Ok(material) => material,
            Err(e) => {
                warn!(error = %e, "error in restoring the key from the bundle");
                return RestoreOutcome::NotRestored;
            }
        };

        let mut slot = self.shared.lock();
        if let Some(current) = &slot.material {
            if current.matches(&bundled) {
                return RestoreOutcome::AlreadyConsistent;
            }
            error!(
                target: "sealkit::security",
                "attempted to restore different cipher material; keeping material in use"
            );
            return RestoreOutcome::Rejected;
        }

        info!(fingerprint = %bundled.fingerprint(), "cipher material restored from bundle");
        slot.material = Some(Arc::new(bundled));
        drop(slot);
        self.shared.settled.notify_all();
        RestoreOutcome::Restored
    }
}

impl Default for CipherFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CipherFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherFactory")
            .field("state", &self.state())
            .field("worker_name", &self.shared.worker_name)
            .finish()
    }
}
