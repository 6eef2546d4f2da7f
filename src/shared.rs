// Lock-free values shared between the chassis loop and the steering loops
//
// The chassis loop is the only writer of a module slot; each steering loop
// only reads its own slot. Nothing here blocks.

use std::sync::atomic::{AtomicU64, Ordering, fence};

use crate::messages::{ModuleSetpoint, ModuleTarget};

/// `f64` stored as its bit pattern in an `AtomicU64`
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    pub fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order);
    }
}

const TAG_HOLD: u64 = 0;
const TAG_DRIVE: u64 = 1;

/// Latest setpoint and zero offset of one module
#[derive(Debug)]
pub struct ModuleSlot {
    // seqlock guarding the three setpoint words, odd while a write is in progress
    sequence: AtomicU64,
    tag: AtomicU64,
    angle: AtomicF64,
    speed: AtomicF64,
    zero_offset: AtomicF64,
    zero_epoch: AtomicU64,
}

impl ModuleSlot {
    pub fn new(zero_offset: f64) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            tag: AtomicU64::new(TAG_HOLD),
            angle: AtomicF64::new(0.0),
            speed: AtomicF64::new(0.0),
            zero_offset: AtomicF64::new(zero_offset),
            zero_epoch: AtomicU64::new(0),
        }
    }

    /// Publish a new setpoint (single writer)
    pub fn publish(&self, setpoint: ModuleSetpoint) {
        let seq = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        match setpoint {
            ModuleSetpoint::Drive(target) => {
                self.tag.store(TAG_DRIVE, Ordering::Relaxed);
                self.angle.store(target.angle(), Ordering::Relaxed);
                self.speed.store(target.speed, Ordering::Relaxed);
            }
            ModuleSetpoint::Hold => {
                self.tag.store(TAG_HOLD, Ordering::Relaxed);
                self.speed.store(0.0, Ordering::Relaxed);
            }
        }

        self.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Read the most recently published setpoint
    pub fn latest(&self) -> ModuleSetpoint {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let tag = self.tag.load(Ordering::Relaxed);
            let angle = self.angle.load(Ordering::Relaxed);
            let speed = self.speed.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return if tag == TAG_DRIVE {
                    ModuleSetpoint::Drive(ModuleTarget::new(angle, speed))
                } else {
                    ModuleSetpoint::Hold
                };
            }
        }
    }

    /// Install a new zero offset and bump the zero epoch
    pub fn set_zero_offset(&self, offset: f64) {
        self.zero_offset.store(offset, Ordering::Release);
        self.zero_epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// `(epoch, offset)`; the epoch changes every time the offset is set
    pub fn zero(&self) -> (u64, f64) {
        let epoch = self.zero_epoch.load(Ordering::Acquire);
        (epoch, self.zero_offset.load(Ordering::Acquire))
    }
}
