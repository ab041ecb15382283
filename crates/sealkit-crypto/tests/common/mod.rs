//! Random-source test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use sealkit_crypto::{CryptoError, CryptoResult, OsRandomSource, RandomByteSource};

/// Real OS randomness, counting every draw.
#[derive(Default)]
pub struct CountingSource {
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RandomByteSource for CountingSource {
    fn get_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        OsRandomSource.get_bytes(len)
    }
}

/// Always fails, counting attempts.
#[derive(Default)]
pub struct FailingSource {
    calls: AtomicUsize,
}

impl FailingSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RandomByteSource for FailingSource {
    fn get_bytes(&self, _len: usize) -> CryptoResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CryptoError::EntropyUnavailable("not enough random data available".into()))
    }
}

/// Blocks every draw until `release` is called.
#[derive(Default)]
pub struct GatedSource {
    open: Mutex<bool>,
    opened: Condvar,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl GatedSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Draws that have returned to the caller.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }

    /// Spin until the background worker is parked inside `get_bytes`.
    pub fn wait_until_entered(&self) {
        while self.calls() == 0 {
            std::thread::yield_now();
        }
    }
}

impl RandomByteSource for GatedSource {
    fn get_bytes(&self, len: usize) -> CryptoResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let open = self.open.lock().unwrap();
        let _open = self.opened.wait_while(open, |open| !*open).unwrap();
        let bytes = OsRandomSource.get_bytes(len);
        self.finished.fetch_add(1, Ordering::SeqCst);
        bytes
    }
}
