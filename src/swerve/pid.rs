// PID controller driven through a trapezoidal motion profile
//
// The goal is approached along a velocity/acceleration limited setpoint, and
// the PID tracks that setpoint rather than jumping straight to the goal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

/// Limits for the trapezoidal profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileConstraints {
    pub max_velocity: f64,
    pub max_acceleration: f64,
}

/// A point along the profile
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileState {
    pub position: f64,
    pub velocity: f64,
}

/// Velocity/acceleration limited approach from `current` toward `goal`
#[derive(Debug, Clone, Copy)]
pub struct TrapezoidProfile {
    constraints: ProfileConstraints,
}

impl TrapezoidProfile {
    pub fn new(constraints: ProfileConstraints) -> Self {
        Self { constraints }
    }

    /// Advance `current` by `dt` seconds toward a stationary `goal`
    pub fn step(&self, dt: f64, current: ProfileState, goal: f64) -> ProfileState {
        let ProfileConstraints {
            max_velocity,
            max_acceleration,
        } = self.constraints;

        let remaining = goal - current.position;
        let direction = remaining.signum();

        // fastest speed from which we can still stop at the goal
        let stopping_velocity = (2.0 * max_acceleration * remaining.abs()).sqrt();
        let desired = direction * max_velocity.min(stopping_velocity);

        let max_change = max_acceleration * dt;
        let velocity =
            current.velocity + (desired - current.velocity).clamp(-max_change, max_change);
        let position = current.position + velocity * dt;

        // overshooting the goal within one step ends the move
        if (goal - position).signum() != direction || remaining == 0.0 {
            ProfileState {
                position: goal,
                velocity: 0.0,
            }
        } else {
            ProfileState { position, velocity }
        }
    }
}

/// PID on the setpoint produced by a trapezoidal profile
#[derive(Debug, Clone)]
pub struct ProfiledPid {
    gains: PidGains,
    profile: TrapezoidProfile,
    period: f64,
    goal: f64,
    setpoint: ProfileState,
    integral: f64,
    prev_error: Option<f64>,
}

impl ProfiledPid {
    /// `period` is the expected time between `calculate` calls, in seconds
    pub fn new(gains: PidGains, constraints: ProfileConstraints, period: f64) -> Self {
        Self {
            gains,
            profile: TrapezoidProfile::new(constraints),
            period,
            goal: 0.0,
            setpoint: ProfileState::default(),
            integral: 0.0,
            prev_error: None,
        }
    }

    /// Change the goal; the current setpoint is kept so motion stays continuous
    pub fn set_goal(&mut self, goal: f64) {
        self.goal = goal;
    }

    pub fn goal(&self) -> f64 {
        self.goal
    }

    pub fn setpoint(&self) -> ProfileState {
        self.setpoint
    }

    /// Restart the profile from a measured position at rest, with the goal there too
    pub fn reset(&mut self, measurement: f64) {
        self.setpoint = ProfileState {
            position: measurement,
            velocity: 0.0,
        };
        self.goal = measurement;
        self.integral = 0.0;
        self.prev_error = None;
    }

    /// Advance the profile one period and return the control output
    pub fn calculate(&mut self, measurement: f64) -> f64 {
        self.setpoint = self.profile.step(self.period, self.setpoint, self.goal);

        let error = self.setpoint.position - measurement;
        self.integral += error * self.period;
        let derivative = match self.prev_error {
            Some(prev) => (error - prev) / self.period,
            None => 0.0,
        };
        self.prev_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONSTRAINTS: ProfileConstraints = ProfileConstraints {
        max_velocity: 2.0,
        max_acceleration: 4.0,
    };

    #[test]
    fn test_profile_respects_limits() {
        let profile = TrapezoidProfile::new(CONSTRAINTS);
        let mut state = ProfileState::default();
        let dt = 0.005;
        for _ in 0..2000 {
            let next = profile.step(dt, state, 3.0);
            assert!(next.velocity.abs() <= CONSTRAINTS.max_velocity + 1e-9);
            if next.position != 3.0 {
                assert!(
                    (next.velocity - state.velocity).abs()
                        <= CONSTRAINTS.max_acceleration * dt + 1e-9
                );
            }
            state = next;
        }
        assert_eq!(state.position, 3.0);
        assert_eq!(state.velocity, 0.0);
    }

    #[test]
    fn test_profile_moves_backward() {
        let profile = TrapezoidProfile::new(CONSTRAINTS);
        let next = profile.step(0.01, ProfileState::default(), -1.0);
        assert!(next.position < 0.0);
        assert!(next.velocity < 0.0);
    }

    #[test]
    fn test_pid_output_sign_follows_goal() {
        let gains = PidGains {
            kp: 5.0,
            ki: 0.0,
            kd: 0.0,
        };
        let mut pid = ProfiledPid::new(gains, CONSTRAINTS, 0.005);
        pid.reset(0.0);
        pid.set_goal(1.0);
        assert!(pid.calculate(0.0) > 0.0);

        pid.reset(0.0);
        pid.set_goal(-1.0);
        assert!(pid.calculate(0.0) < 0.0);
    }

    #[test]
    fn test_pid_at_goal_is_quiet() {
        let gains = PidGains {
            kp: 5.0,
            ki: 1.0,
            kd: 0.1,
        };
        let mut pid = ProfiledPid::new(gains, CONSTRAINTS, 0.005);
        pid.reset(0.5);
        assert_eq!(pid.calculate(0.5), 0.0);
        assert_eq!(pid.goal(), 0.5);
    }
}
