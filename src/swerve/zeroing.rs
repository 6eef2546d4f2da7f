// Azimuth zero (home) offsets for every module
//
// An offset is the absolute encoder reading, in rotations, that corresponds to
// azimuth 0. Offsets only change on an explicit zero command; every honored
// command marks the offsets as needing to be persisted.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::math::positive_mod;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ZeroError {
    #[error("no module with index {index} ({count} modules)")]
    UnknownModule { index: usize, count: usize },

    #[error("expected {expected} encoder readings, got {got}")]
    ReadingCount { expected: usize, got: usize },
}

/// Persisted zero reference of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroOffset {
    pub module: String,
    /// rotations, `[0, 1)`
    pub offset: f64,
}

/// What a zero command did
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroEvent {
    /// indices of the modules that were zeroed
    pub modules: Vec<usize>,
    /// whether any offset actually moved
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct ZeroingCoordinator {
    offsets: Vec<ZeroOffset>,
    persist_pending: bool,
}

impl ZeroingCoordinator {
    /// Start from previously persisted offsets
    pub fn new(offsets: Vec<ZeroOffset>) -> Self {
        Self {
            offsets: offsets
                .into_iter()
                .map(|o| ZeroOffset {
                    offset: positive_mod(o.offset, 1.0),
                    module: o.module,
                })
                .collect(),
            persist_pending: false,
        }
    }

    pub fn offsets(&self) -> &[ZeroOffset] {
        &self.offsets
    }

    pub fn offset(&self, index: usize) -> Option<f64> {
        self.offsets.get(index).map(|o| o.offset)
    }

    /// Azimuth of a module as a fraction of a rotation in `[0, 1)`
    pub fn measured_fraction(&self, index: usize, raw_rotations: f64) -> Option<f64> {
        self.offset(index)
            .map(|offset| relative_fraction(raw_rotations, offset))
    }

    /// Make every module's current orientation its new zero
    ///
    /// `readings` are the absolute encoder readings (rotations) in module order.
    pub fn zero_all(&mut self, readings: &[f64]) -> Result<ZeroEvent, ZeroError> {
        if readings.len() != self.offsets.len() {
            return Err(ZeroError::ReadingCount {
                expected: self.offsets.len(),
                got: readings.len(),
            });
        }
        info!("Zeroing all {} modules", self.offsets.len());

        let mut changed = false;
        for (index, &reading) in readings.iter().enumerate() {
            changed |= self.store(index, reading);
        }
        self.persist_pending = true;

        Ok(ZeroEvent {
            modules: (0..self.offsets.len()).collect(),
            changed,
        })
    }

    /// Make one module's current orientation its new zero
    pub fn zero_one(&mut self, index: usize, reading: f64) -> Result<ZeroEvent, ZeroError> {
        if index >= self.offsets.len() {
            return Err(ZeroError::UnknownModule {
                index,
                count: self.offsets.len(),
            });
        }
        info!("Zeroing module {} ({})", index, self.offsets[index].module);

        let changed = self.store(index, reading);
        self.persist_pending = true;

        Ok(ZeroEvent {
            modules: vec![index],
            changed,
        })
    }

    fn store(&mut self, index: usize, reading: f64) -> bool {
        let offset = positive_mod(reading, 1.0);
        let entry = &mut self.offsets[index];
        let changed = entry.offset != offset;
        entry.offset = offset;
        changed
    }

    /// Offsets to persist, if a zero command was honored since the last call
    pub fn take_persist_request(&mut self) -> Option<Vec<ZeroOffset>> {
        if std::mem::take(&mut self.persist_pending) {
            Some(self.offsets.clone())
        } else {
            None
        }
    }
}

/// Reading relative to a zero offset, as a fraction of a rotation in `[0, 1)`
pub fn relative_fraction(raw_rotations: f64, offset: f64) -> f64 {
    positive_mod(raw_rotations - offset, 1.0)
}
