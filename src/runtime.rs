// Chassis loop (20 ms) and per-module steering loops (5 ms)
//
// The chassis loop shapes driver input, runs the kinematics and publishes one
// setpoint per module; each steering loop picks up the latest setpoint and
// drives its module. They share nothing but atomics (see `shared`).
// Stopping waits for every loop to exit, so once `stop` returns no further
// motor command is issued.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

// local imports
use crate::config::{CHASSIS_LOOP_PERIOD, STEER_LOOP_PERIOD, SwerveConfig};
use crate::control::{ControlSignals, Mode};
use crate::hardware::{
    AbsoluteEncoder, Gyro, Hardware, InputSource, ModuleHardware, ModuleMotors, ZeroStore,
};
use crate::input::{InputShaper, PiecewiseLinearCurve};
use crate::messages::{ModuleSetpoint, MotorPair, RuntimeHealth, RuntimeStatus};
use crate::shared::ModuleSlot;
use crate::swerve::zeroing::relative_fraction;
use crate::swerve::{
    ChassisKinematics, FrameMode, ModuleSteeringController, ZeroOffset, ZeroingCoordinator,
};

/// Pending zero offset writes allowed before new ones are dropped
const PERSIST_QUEUE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{configured} modules configured but hardware for {available}")]
    ModuleCount { configured: usize, available: usize },

    #[error("runtime task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Requests from the handle to the chassis loop
#[derive(Debug, Clone)]
enum RuntimeCommand {
    UpdateProfile { x_vals: String, y_vals: String },
    SetCurve(PiecewiseLinearCurve),
    SetRobotCentric(bool),
}

/// Steering loop of one module
struct SteeringTask {
    slot: Arc<ModuleSlot>,
    controller: ModuleSteeringController,
    hardware: ModuleHardware,
    zero_epoch: Option<u64>,
    write_failing: bool,
}

impl SteeringTask {
    fn tick(&mut self) {
        let (epoch, offset) = self.slot.zero();
        if self.zero_epoch != Some(epoch) {
            if self.zero_epoch.is_some() {
                debug!("Module {} re-zeroed, resetting servo", self.controller.name());
                self.controller.reset();
            }
            self.zero_epoch = Some(epoch);
        }

        let raw = self.hardware.encoder.rotations();
        let command = if raw.is_finite() {
            let measured = relative_fraction(raw, offset);
            self.controller.tick(self.slot.latest(), measured).motors
        } else {
            MotorPair::zero()
        };
        let command = if command.motor1.is_finite() && command.motor2.is_finite() {
            command
        } else {
            MotorPair::zero()
        };

        match self.hardware.motors.set_velocities(command) {
            Ok(()) => {
                if self.write_failing {
                    info!("Module {} motor writes recovered", self.controller.name());
                }
                self.write_failing = false;
            }
            Err(e) => {
                if !self.write_failing {
                    warn!("{}", e);
                }
                self.write_failing = true;
            }
        }
    }

    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(STEER_LOOP_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            if *stop.borrow() {
                break;
            }
            self.tick();
        }

        if let Err(e) = self.hardware.motors.disable() {
            warn!("Failed to disable module {}: {}", self.controller.name(), e);
        }
        debug!("Steering loop {} stopped", self.controller.name());
    }
}

/// One cycle of chassis-level work, owned by the chassis loop
struct ChassisCycle {
    config: SwerveConfig,
    kinematics: ChassisKinematics,
    shaper: InputShaper,
    mode: Mode,
    robot_centric: bool,
    zeroing: ZeroingCoordinator,
    slots: Vec<Arc<ModuleSlot>>,
    encoders: Vec<Arc<dyn AbsoluteEncoder>>,
    gyro: Arc<dyn Gyro>,
    input: Box<dyn InputSource>,
    signals: Arc<ControlSignals>,
    persist_tx: mpsc::Sender<Vec<ZeroOffset>>,
    persist_result_rx: mpsc::UnboundedReceiver<Result<(), String>>,
    persist_error: Option<String>,
    status_tx: watch::Sender<RuntimeStatus>,
}

impl ChassisCycle {
    fn apply_command(&mut self, command: RuntimeCommand) {
        match command {
            RuntimeCommand::UpdateProfile { x_vals, y_vals } => {
                self.shaper.update_profile(&x_vals, &y_vals);
            }
            RuntimeCommand::SetCurve(curve) => {
                info!("Joystick profile replaced");
                self.shaper.set_curve(curve);
            }
            RuntimeCommand::SetRobotCentric(robot_centric) => {
                if self.robot_centric != robot_centric {
                    info!(
                        "Switching to {} control",
                        if robot_centric { "robot centric" } else { "field centric" }
                    );
                }
                self.robot_centric = robot_centric;
            }
        }
    }

    fn handle_zero_requests(&mut self) {
        if self.signals.take_zero_gyro() {
            info!("Zeroing gyro");
            self.gyro.zero_yaw();
        }

        if self.signals.take_zero_all() {
            let readings: Vec<f64> = self.encoders.iter().map(|e| e.rotations()).collect();
            match self.zeroing.zero_all(&readings) {
                Ok(event) => self.publish_offsets(&event.modules),
                Err(e) => warn!("Zero all rejected: {}", e),
            }
        }

        for index in 0..self.slots.len() {
            if self.signals.take_zero_module(index) {
                let reading = self.encoders[index].rotations();
                match self.zeroing.zero_one(index, reading) {
                    Ok(event) => self.publish_offsets(&event.modules),
                    Err(e) => warn!("Zero module rejected: {}", e),
                }
            }
        }

        if let Some(offsets) = self.zeroing.take_persist_request() {
            // persistence happens off the control path
            if let Err(e) = self.persist_tx.try_send(offsets) {
                warn!("Zero offsets not queued for persistence: {}", e);
                self.persist_error = Some(format!("zero offsets not saved: {}", e));
            }
        }
    }

    fn publish_offsets(&self, modules: &[usize]) {
        for &index in modules {
            let offset = self.zeroing.offset(index);
            if let (Some(slot), Some(offset)) = (self.slots.get(index), offset) {
                slot.set_zero_offset(offset);
            }
        }
    }

    fn run_cycle(&mut self) {
        let sample = self.input.poll();
        let output = self.mode.step(
            &sample,
            &self.shaper,
            self.gyro.heading(),
            self.config.heading_kp,
        );
        if output.zero_gyro {
            self.signals.request_zero_gyro();
        }

        self.handle_zero_requests();

        while let Ok(result) = self.persist_result_rx.try_recv() {
            self.persist_error = result.err();
        }

        let heading = self.gyro.heading();
        let frame = if self.robot_centric {
            FrameMode::RobotCentric
        } else {
            FrameMode::FieldCentric
        };
        let setpoints = self
            .kinematics
            .compute_module_targets(output.request, heading, frame);

        let mut holding = Vec::new();
        for ((slot, setpoint), geometry) in self
            .slots
            .iter()
            .zip(&setpoints)
            .zip(self.kinematics.geometries())
        {
            if *setpoint == ModuleSetpoint::Hold {
                holding.push(geometry.name.as_str());
            }
            slot.publish(*setpoint);
        }

        let mut messages: Vec<String> =
            self.shaper.faults().iter().map(|f| f.to_string()).collect();
        if !holding.is_empty() {
            messages.push(format!("holding modules {}: target not finite", holding.join(",")));
        }
        if let Some(e) = &self.persist_error {
            messages.push(e.clone());
        }

        let status = RuntimeStatus {
            health: if messages.is_empty() {
                RuntimeHealth::Ok
            } else {
                RuntimeHealth::Degraded
            },
            message: (!messages.is_empty()).then(|| messages.join("; ")),
            heading,
            robot_centric: self.robot_centric,
        };
        self.status_tx.send_if_modified(|current| {
            if *current != status {
                if current.health != status.health || current.message != status.message {
                    let message = status.message.as_deref().unwrap_or("");
                    info!("Status: {:?} {}", status.health, message);
                }
                *current = status;
                true
            } else {
                false
            }
        });
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<RuntimeCommand>,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(CHASSIS_LOOP_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }
            if *stop.borrow() {
                break;
            }

            // 1. Drain pending handle commands (non-blocking)
            while let Ok(command) = commands.try_recv() {
                self.apply_command(command);
            }

            // 2. Input -> kinematics -> publish
            self.run_cycle();
        }

        for slot in &self.slots {
            slot.publish(ModuleSetpoint::Hold);
        }
        self.status_tx.send_modify(|status| {
            status.health = RuntimeHealth::Stopped;
            status.message = Some("stopped".to_string());
        });
        info!("Chassis loop stopped");
    }
}

fn persist_worker(
    mut store: Box<dyn ZeroStore>,
    mut requests: mpsc::Receiver<Vec<ZeroOffset>>,
    results: mpsc::UnboundedSender<Result<(), String>>,
) {
    while let Some(offsets) = requests.blocking_recv() {
        let result = store.persist(&offsets).map_err(|e| {
            warn!("{}", e);
            e.to_string()
        });
        if results.send(result).is_err() {
            break;
        }
    }
}

/// Control surface of a running swerve runtime
pub struct RuntimeHandle {
    stop_tx: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<RuntimeCommand>,
    signals: Arc<ControlSignals>,
    status: watch::Receiver<RuntimeStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    pub fn request_zero_all(&self) {
        self.signals.request_zero_all();
    }

    /// Returns false if there is no module `index`
    pub fn request_zero_module(&self, index: usize) -> bool {
        self.signals.request_zero_module(index)
    }

    pub fn request_zero_gyro(&self) {
        self.signals.request_zero_gyro();
    }

    /// Reload the joystick profile from comma-separated point lists
    pub fn update_profile(&self, x_vals: &str, y_vals: &str) {
        self.send(RuntimeCommand::UpdateProfile {
            x_vals: x_vals.to_string(),
            y_vals: y_vals.to_string(),
        });
    }

    pub fn set_curve(&self, curve: PiecewiseLinearCurve) {
        self.send(RuntimeCommand::SetCurve(curve));
    }

    pub fn set_robot_centric(&self, robot_centric: bool) {
        self.send(RuntimeCommand::SetRobotCentric(robot_centric));
    }

    fn send(&self, command: RuntimeCommand) {
        if self.commands.send(command).is_err() {
            warn!("Runtime is not running, command dropped");
        }
    }

    /// Latest status snapshot
    pub fn status(&self) -> RuntimeStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RuntimeStatus> {
        self.status.clone()
    }

    /// Stop every loop and wait for them to exit
    ///
    /// Every task is joined even if one of them failed; the first failure is
    /// returned once nothing is left running.
    pub async fn stop(self) -> Result<(), RuntimeError> {
        info!("Stopping swerve runtime");
        self.stop_tx.send_replace(true);
        let mut first_error = None;
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Runtime task failed: {}", e);
                first_error.get_or_insert(RuntimeError::Task(e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Spawn the chassis loop, one steering loop per module and the persistence worker
///
/// Must be called from within a tokio runtime.
pub fn start(config: SwerveConfig, hardware: Hardware) -> Result<RuntimeHandle, RuntimeError> {
    if hardware.modules.len() != config.modules.len() {
        return Err(RuntimeError::ModuleCount {
            configured: config.modules.len(),
            available: hardware.modules.len(),
        });
    }

    let Hardware {
        modules,
        gyro,
        input,
        zero_store,
    } = hardware;

    let (stop_tx, stop_rx) = watch::channel(false);
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (persist_tx, persist_rx) = mpsc::channel(PERSIST_QUEUE);
    let (persist_result_tx, persist_result_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(RuntimeStatus {
        robot_centric: config.robot_centric,
        ..Default::default()
    });
    let signals = Arc::new(ControlSignals::new(config.modules.len()));

    let zeroing = ZeroingCoordinator::new(config.zero_offsets.clone());
    let slots: Vec<Arc<ModuleSlot>> = (0..config.modules.len())
        .map(|i| Arc::new(ModuleSlot::new(zeroing.offset(i).unwrap_or(0.0))))
        .collect();

    let mut tasks = Vec::with_capacity(modules.len() + 2);
    let mut encoders = Vec::with_capacity(modules.len());
    let steering = config.steering_config();
    for ((module, geometry), slot) in modules.into_iter().zip(&config.modules).zip(&slots) {
        encoders.push(Arc::clone(&module.encoder));
        let task = SteeringTask {
            slot: Arc::clone(slot),
            controller: ModuleSteeringController::new(geometry.name.clone(), steering),
            hardware: module,
            zero_epoch: None,
            write_failing: false,
        };
        tasks.push(tokio::spawn(task.run(stop_rx.clone())));
    }

    tasks.push(tokio::task::spawn_blocking(move || {
        persist_worker(zero_store, persist_rx, persist_result_tx)
    }));

    let chassis = ChassisCycle {
        kinematics: config.kinematics(),
        shaper: config.input_shaper(),
        mode: Mode::default(),
        robot_centric: config.robot_centric,
        zeroing,
        slots,
        encoders,
        gyro,
        input,
        signals: Arc::clone(&signals),
        persist_tx,
        persist_result_rx,
        persist_error: None,
        status_tx,
        config,
    };
    tasks.push(tokio::spawn(chassis.run(command_rx, stop_rx)));

    info!(
        "Swerve runtime started: {} modules, steering {}ms, chassis {}ms",
        signals.module_count(),
        STEER_LOOP_PERIOD.as_millis(),
        CHASSIS_LOOP_PERIOD.as_millis()
    );

    Ok(RuntimeHandle {
        stop_tx,
        commands: command_tx,
        signals,
        status: status_rx,
        tasks,
    })
}
