//! Single-ownership lifecycle for the shared accelerator.
//!
//! The device slot is an explicit handle passed to and returned from each
//! stage, never ambient global state. Acquiring while another engine is
//! live is an error; releasing synchronously shuts the engine down before
//! the slot is marked free, so a subsequent acquire always sees a clear
//! device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use video_caption_common::{CaptionError, Result};

use crate::InferenceEngine;

/// Exclusive claim on the inference device
#[derive(Debug, Default)]
pub struct DeviceSlot {
    occupied: Arc<AtomicBool>,
}

impl DeviceSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an engine into the slot.
    ///
    /// Fails with [`CaptionError::DeviceBusy`] if an engine is already live,
    /// and propagates loader failures as fatal: a partially-loaded large
    /// model cannot be safely resumed, so there is no retry.
    pub fn acquire<F>(&self, loader: F) -> Result<EngineGuard>
    where
        F: FnOnce() -> Result<Box<dyn InferenceEngine>>,
    {
        if self
            .occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptionError::DeviceBusy);
        }

        match loader() {
            Ok(engine) => Ok(EngineGuard {
                engine: Some(engine),
                occupied: self.occupied.clone(),
            }),
            Err(err) => {
                self.occupied.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Whether an engine currently holds the device
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }
}

/// A live engine bound to its device slot.
///
/// Dropping the guard releases the engine as a fallback, but the scheduler
/// calls [`EngineGuard::release`] explicitly so teardown failures surface.
pub struct EngineGuard {
    engine: Option<Box<dyn InferenceEngine>>,
    occupied: Arc<AtomicBool>,
}

impl EngineGuard {
    /// Access the live engine
    #[must_use]
    pub fn engine(&self) -> &dyn InferenceEngine {
        self.engine
            .as_deref()
            .expect("engine present until release")
    }

    /// Tear the engine down and free the slot.
    ///
    /// Returns only after the engine has released device memory.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(engine) = self.engine.take() else {
            return Ok(());
        };
        info!("Releasing inference engine");
        let result = engine.shutdown();
        self.occupied.store(false, Ordering::Release);
        result
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        if let Err(err) = self.release_inner() {
            error!("Engine teardown during drop failed: {err}");
        }
    }
}
