// Per-module steering: shortest-rotation goal selection, steering servo and
// differential motor mixing
//
// Positions here are fractions of a full azimuth rotation. The servo is never
// asked to steer more than a quarter turn: larger moves are replaced by a
// smaller move to the opposite azimuth with the drive direction flipped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::math::{TWO_PI, positive_mod, sign};
use super::pid::{PidGains, ProfileConstraints, ProfiledPid};
use crate::messages::{ModuleSetpoint, MotorPair};

/// Goal changes smaller than this (in rotations) do not re-seed the servo
const GOAL_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteeringConfig {
    /// motor rotations per ring gear (azimuth) rotation
    pub steering_gear_ratio: f64,
    /// motor rotations per wheel axle rotation
    pub drive_gear_ratio: f64,
    /// rad/s limit on each motor
    pub max_motor_speed: f64,
    pub gains: PidGains,
    pub constraints: ProfileConstraints,
    /// steering loop period in seconds
    pub period: f64,
}

/// Where the servo should go and whether the drive is inverted to get there
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringDecision {
    /// servo goal in rotations, within a quarter turn of the current position
    pub goal: f64,
    pub reversed: bool,
}

/// Pick the servo goal for a measured position and a target (both in rotations)
///
/// `current` is expected in `[0, 1)` and `target` in `[0, 1)`. The returned
/// goal may lie outside `[0, 1)` but is always within 0.25 of `current`.
pub fn plan_steering(current: f64, target: f64) -> SteeringDecision {
    let mut goal = target;

    let error = current - goal;
    if error.abs() > 0.5 {
        // bring the goal within half a rotation of the current position
        goal += sign(error);
    }

    let error = current - goal;
    let reversed = error.abs() > 0.25;
    if reversed {
        // steer to the opposite azimuth and spin the wheel backwards
        goal += sign(error) * 0.5;
    }

    SteeringDecision { goal, reversed }
}

/// Split steer and drive rates across the two motors of a differential module
///
/// Motor 1 runs at `steer + spin`, motor 2 at `steer - spin` (both scaled by
/// their gear ratios). When `|steer| + |spin|` would exceed `max_motor_speed`
/// both parts are scaled by the same factor so their ratio is kept.
pub fn mix_motors(steer_rate: f64, drive_speed: f64, config: &SteeringConfig) -> MotorPair {
    let mut motor_steer = steer_rate * config.steering_gear_ratio;
    let mut motor_spin = drive_speed * config.drive_gear_ratio;

    let demand = motor_steer.abs() + motor_spin.abs();
    if demand > config.max_motor_speed {
        let scale_down = config.max_motor_speed / demand;
        motor_steer *= scale_down;
        motor_spin *= scale_down;
    }

    MotorPair::new(motor_steer + motor_spin, motor_steer - motor_spin)
}

/// Result of one steering tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleOutput {
    /// servo output, azimuth rad/s
    pub steer_rate: f64,
    /// wheel speed after the reversal sign is applied
    pub drive_speed: f64,
    pub motors: MotorPair,
    pub reversed: bool,
    /// servo goal in rotations
    pub goal: f64,
}

pub struct ModuleSteeringController {
    name: String,
    config: SteeringConfig,
    pid: ProfiledPid,
    /// measured azimuth with whole turns kept, so the servo never sees the 1 -> 0 jump
    continuous: Option<f64>,
    /// goal last handed to the servo, continuous rotations
    goal: Option<f64>,
    /// continuous azimuth captured when holding started
    hold_position: Option<f64>,
    reversed: bool,
}

impl ModuleSteeringController {
    pub fn new(name: impl Into<String>, config: SteeringConfig) -> Self {
        Self {
            name: name.into(),
            pid: ProfiledPid::new(config.gains, config.constraints, config.period),
            config,
            continuous: None,
            goal: None,
            hold_position: None,
            reversed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    /// Forget servo state, e.g. after the azimuth reference was re-zeroed
    pub fn reset(&mut self) {
        self.continuous = None;
        self.goal = None;
        self.hold_position = None;
        self.reversed = false;
    }

    /// Follow `measured` across the wrap, assuming less than half a turn per tick
    fn track(&mut self, measured: f64) -> f64 {
        let position = match self.continuous {
            Some(previous) => {
                let step = positive_mod(measured - previous, 1.0);
                previous + if step > 0.5 { step - 1.0 } else { step }
            }
            None => measured,
        };
        self.continuous = Some(position);
        position
    }

    /// Run one steering cycle
    ///
    /// # Arguments
    /// * `setpoint` - latest published setpoint for this module
    /// * `measured` - measured azimuth as a fraction of a rotation, `[0, 1)`
    pub fn tick(&mut self, setpoint: ModuleSetpoint, measured: f64) -> ModuleOutput {
        let position = self.track(measured);

        let (decision, servo_goal, speed) = match setpoint {
            ModuleSetpoint::Drive(target) => {
                self.hold_position = None;
                let decision = plan_steering(measured, target.angle() / TWO_PI);
                let servo_goal = position + (decision.goal - measured);
                (decision, servo_goal, target.speed)
            }
            ModuleSetpoint::Hold => {
                let hold = *self.hold_position.get_or_insert(position);
                let decision = SteeringDecision {
                    goal: measured + (hold - position),
                    reversed: false,
                };
                (decision, hold, 0.0)
            }
        };
        self.reversed = decision.reversed;

        match self.goal {
            None => {
                self.pid.reset(position * TWO_PI);
                self.pid.set_goal(servo_goal * TWO_PI);
                self.goal = Some(servo_goal);
            }
            Some(goal) if (goal - servo_goal).abs() > GOAL_EPSILON => {
                debug!(
                    "Module {} goal {:.4} -> {:.4} rot (reversed={})",
                    self.name, goal, servo_goal, decision.reversed
                );
                self.pid.set_goal(servo_goal * TWO_PI);
                self.goal = Some(servo_goal);
            }
            Some(_) => {}
        }

        let steer_rate = self.pid.calculate(position * TWO_PI);
        let drive_speed = if decision.reversed { -speed } else { speed };

        ModuleOutput {
            steer_rate,
            drive_speed,
            motors: mix_motors(steer_rate, drive_speed, &self.config),
            reversed: decision.reversed,
            goal: decision.goal,
        }
    }
}
