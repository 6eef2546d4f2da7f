// Simulated swerve hardware
//
// Each simulated module integrates the azimuth rate implied by its two motor
// commands. Differential mixing means motor1 = steer + spin and
// motor2 = steer - spin, so steer = (motor1 + motor2) / 2 at the motor shaft.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use super::{
    AbsoluteEncoder, Gyro, Hardware, HardwareError, InputSource, ModuleHardware, ModuleMotors,
    PersistError, ZeroStore,
};
use crate::messages::{ControllerState, MotorPair};
use crate::shared::AtomicF64;
use crate::swerve::ZeroOffset;
use crate::swerve::math::TWO_PI;

/// Physical state of one simulated module, shared between its encoder and motors
#[derive(Debug)]
pub struct SimModuleState {
    /// absolute azimuth in rotations
    azimuth: AtomicF64,
    motor1: AtomicF64,
    motor2: AtomicF64,
    disabled: AtomicBool,
    /// velocity commands accepted so far
    writes: AtomicUsize,
}

impl SimModuleState {
    pub fn new(azimuth: f64) -> Self {
        Self {
            azimuth: AtomicF64::new(azimuth),
            motor1: AtomicF64::new(0.0),
            motor2: AtomicF64::new(0.0),
            disabled: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn azimuth(&self) -> f64 {
        self.azimuth.load(Ordering::Acquire)
    }

    /// Move the wheel by hand
    pub fn set_azimuth(&self, rotations: f64) {
        self.azimuth.store(rotations, Ordering::Release);
    }

    pub fn motors(&self) -> MotorPair {
        MotorPair::new(
            self.motor1.load(Ordering::Acquire),
            self.motor2.load(Ordering::Acquire),
        )
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Acquire)
    }
}

pub struct SimEncoder {
    state: Arc<SimModuleState>,
}

impl AbsoluteEncoder for SimEncoder {
    fn rotations(&self) -> f64 {
        self.state.azimuth()
    }
}

pub struct SimMotors {
    name: String,
    state: Arc<SimModuleState>,
    steering_gear_ratio: f64,
    last_write: Option<Instant>,
}

impl SimMotors {
    fn integrate(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_write {
            let dt = now.duration_since(last).as_secs_f64();
            let prev = self.state.motors();
            // azimuth rate in rad/s at the ring gear
            let steer = (prev.motor1 + prev.motor2) / 2.0 / self.steering_gear_ratio;
            let azimuth = self.state.azimuth() + steer * dt / TWO_PI;
            self.state.set_azimuth(azimuth);
        }
        self.last_write = Some(now);
    }
}

impl ModuleMotors for SimMotors {
    fn set_velocities(&mut self, command: MotorPair) -> Result<(), HardwareError> {
        if self.state.is_disabled() {
            return Err(HardwareError::MotorWrite {
                module: self.name.clone(),
                reason: "motors are disabled".to_string(),
            });
        }
        self.integrate();
        self.state.motor1.store(command.motor1, Ordering::Release);
        self.state.motor2.store(command.motor2, Ordering::Release);
        self.state.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), HardwareError> {
        self.integrate();
        debug!("Sim module {} disabled", self.name);
        self.state.motor1.store(0.0, Ordering::Release);
        self.state.motor2.store(0.0, Ordering::Release);
        self.state.disabled.store(true, Ordering::Release);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SimGyro {
    heading: AtomicF64,
}

impl SimGyro {
    pub fn set_heading(&self, radians: f64) {
        self.heading.store(radians, Ordering::Release);
    }
}

impl Gyro for SimGyro {
    fn heading(&self) -> f64 {
        self.heading.load(Ordering::Acquire)
    }

    fn zero_yaw(&self) {
        self.heading.store(0.0, Ordering::Release);
    }
}

/// Controller input that can be changed from outside while the runtime runs
#[derive(Clone, Default)]
pub struct SharedInput {
    state: Arc<Mutex<ControllerState>>,
}

impl SharedInput {
    pub fn set(&self, state: ControllerState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }
}

impl InputSource for SharedInput {
    fn poll(&mut self) -> ControllerState {
        match self.state.lock() {
            // button edges are reported once
            Ok(mut current) => {
                let sample = *current;
                current.start_released = false;
                sample
            }
            Err(_) => ControllerState::default(),
        }
    }
}

/// Zero store that keeps the last persisted offsets in memory
#[derive(Clone, Default)]
pub struct MemoryZeroStore {
    saved: Arc<Mutex<Vec<Vec<ZeroOffset>>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryZeroStore {
    /// Every persist call so far, oldest first
    pub fn history(&self) -> Vec<Vec<ZeroOffset>> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make subsequent persists fail
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }
}

impl ZeroStore for MemoryZeroStore {
    fn persist(&mut self, offsets: &[ZeroOffset]) -> Result<(), PersistError> {
        if self.fail.load(Ordering::Acquire) {
            return Err(PersistError("simulated store is read-only".to_string()));
        }
        info!("Persisting {} zero offsets", offsets.len());
        self.saved
            .lock()
            .map_err(|e| PersistError(e.to_string()))?
            .push(offsets.to_vec());
        Ok(())
    }
}

/// Handles kept by the caller to observe and poke the simulation
pub struct SimHandles {
    pub modules: Vec<Arc<SimModuleState>>,
    pub gyro: Arc<SimGyro>,
    pub input: SharedInput,
    pub zero_store: MemoryZeroStore,
}

/// Build a complete simulated robot with `module_names.len()` modules
pub fn sim_hardware(module_names: &[String], steering_gear_ratio: f64) -> (Hardware, SimHandles) {
    let states: Vec<Arc<SimModuleState>> = module_names
        .iter()
        .map(|_| Arc::new(SimModuleState::new(0.0)))
        .collect();
    let modules = module_names
        .iter()
        .zip(&states)
        .map(|(name, state)| ModuleHardware {
            encoder: Arc::new(SimEncoder {
                state: Arc::clone(state),
            }),
            motors: Box::new(SimMotors {
                name: name.clone(),
                state: Arc::clone(state),
                steering_gear_ratio,
                last_write: None,
            }),
        })
        .collect();

    let gyro = Arc::new(SimGyro::default());
    let input = SharedInput::default();
    let zero_store = MemoryZeroStore::default();

    let hardware = Hardware {
        modules,
        gyro: gyro.clone(),
        input: Box::new(input.clone()),
        zero_store: Box::new(zero_store.clone()),
    };
    let handles = SimHandles {
        modules: states,
        gyro,
        input,
        zero_store,
    };
    (hardware, handles)
}
