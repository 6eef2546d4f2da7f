// Operating modes and one-shot operator signals
//
// Modes turn a controller sample into a chassis motion request. They are a
// plain enum dispatched once per chassis cycle.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::input::InputShaper;
use crate::messages::{ControllerState, MotionRequest};
use crate::swerve::math::angular_difference;

/// What a mode produced this cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModeOutput {
    pub request: MotionRequest,
    /// the driver asked for the gyro to be zeroed
    pub zero_gyro: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Mode {
    /// sticks translate, triggers rotate
    #[default]
    DriverControl,
    /// sticks translate, rotation servoes to a fixed heading picked on the d-pad
    HeadingHold { target: f64 },
}

impl Mode {
    /// Run one cycle of the active mode, possibly switching to another
    ///
    /// # Arguments
    /// * `input` - latest controller sample
    /// * `shaper` - axis shaping shared by all modes
    /// * `heading` - gyroscope heading, radians clockwise positive
    /// * `heading_kp` - proportional gain of the heading hold
    pub fn step(
        &mut self,
        input: &ControllerState,
        shaper: &InputShaper,
        heading: f64,
        heading_kp: f64,
    ) -> ModeOutput {
        let vx = shaper.shape(input.left_x);
        let vy = shaper.shape(input.left_y);
        let trigger_rotate = shaper.shape(-(input.right_trigger.abs() - input.left_trigger.abs()));

        if let Some(target) = input.pov.heading() {
            if *self != (Mode::HeadingHold { target }) {
                info!("Heading hold engaged at {:.1} deg", target.to_degrees());
            }
            *self = Mode::HeadingHold { target };
        } else if trigger_rotate != 0.0 && matches!(self, Mode::HeadingHold { .. }) {
            info!("Heading hold released, back to driver control");
            *self = Mode::DriverControl;
        }

        let w = match *self {
            Mode::DriverControl => trigger_rotate,
            Mode::HeadingHold { target } => {
                // positive w turns counter-clockwise, heading is clockwise positive
                (-heading_kp * angular_difference(heading, target)).clamp(-1.0, 1.0)
            }
        };

        ModeOutput {
            request: MotionRequest::new(vx, vy, w),
            zero_gyro: input.start_released,
        }
    }
}

/// Operator requests, each raised once and consumed once
///
/// Flags are level-triggered: a request stays set until the chassis loop
/// honors it and clears it, so each raise is acted on exactly once.
#[derive(Debug)]
pub struct ControlSignals {
    zero_all: AtomicBool,
    zero_gyro: AtomicBool,
    zero_module: Vec<AtomicBool>,
}

impl ControlSignals {
    pub fn new(module_count: usize) -> Self {
        Self {
            zero_all: AtomicBool::new(false),
            zero_gyro: AtomicBool::new(false),
            zero_module: (0..module_count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn request_zero_all(&self) {
        self.zero_all.store(true, Ordering::Release);
    }

    pub fn request_zero_gyro(&self) {
        self.zero_gyro.store(true, Ordering::Release);
    }

    /// Returns false if there is no module `index`
    pub fn request_zero_module(&self, index: usize) -> bool {
        match self.zero_module.get(index) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn take_zero_all(&self) -> bool {
        self.zero_all.swap(false, Ordering::AcqRel)
    }

    pub fn take_zero_gyro(&self) -> bool {
        self.zero_gyro.swap(false, Ordering::AcqRel)
    }

    pub fn take_zero_module(&self, index: usize) -> bool {
        self.zero_module
            .get(index)
            .is_some_and(|flag| flag.swap(false, Ordering::AcqRel))
    }

    pub fn module_count(&self) -> usize {
        self.zero_module.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Pov;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_driver_control_shapes_axes() {
        let shaper = InputShaper::default();
        let mut mode = Mode::DriverControl;
        let input = ControllerState {
            left_x: 1.0,
            left_y: -0.05,
            right_trigger: 1.0,
            ..Default::default()
        };
        let out = mode.step(&input, &shaper, 0.0, 1.0);
        assert!((out.request.vx - 1.0).abs() < 1e-9);
        assert_eq!(out.request.vy, 0.0);
        // right trigger turns clockwise
        assert!((out.request.w + 1.0).abs() < 1e-9);
        assert!(!out.zero_gyro);
    }

    #[test]
    fn test_start_release_requests_gyro_zero() {
        let shaper = InputShaper::default();
        let mut mode = Mode::default();
        let input = ControllerState {
            start_released: true,
            ..Default::default()
        };
        assert!(mode.step(&input, &shaper, 0.0, 1.0).zero_gyro);
    }

    #[test]
    fn test_pov_engages_heading_hold() {
        let shaper = InputShaper::default();
        let mut mode = Mode::DriverControl;
        let input = ControllerState {
            pov: Pov::Right,
            ..Default::default()
        };
        let out = mode.step(&input, &shaper, 0.0, 0.5);
        assert_eq!(mode, Mode::HeadingHold { target: FRAC_PI_2 });
        // target is clockwise of the current heading -> turn clockwise
        assert!(out.request.w < 0.0);

        // released d-pad keeps holding, and at the target the rotation stops
        let out = mode.step(&ControllerState::default(), &shaper, FRAC_PI_2, 0.5);
        assert_eq!(mode, Mode::HeadingHold { target: FRAC_PI_2 });
        assert!(out.request.w.abs() < 1e-12);
    }

    #[test]
    fn test_triggers_release_heading_hold() {
        let shaper = InputShaper::default();
        let mut mode = Mode::HeadingHold { target: 1.0 };
        let input = ControllerState {
            left_trigger: 0.8,
            ..Default::default()
        };
        let out = mode.step(&input, &shaper, 0.0, 1.0);
        assert_eq!(mode, Mode::DriverControl);
        assert!(out.request.w > 0.0);
    }

    #[test]
    fn test_signals_are_one_shot() {
        let signals = ControlSignals::new(2);
        assert!(!signals.take_zero_all());
        signals.request_zero_all();
        assert!(signals.take_zero_all());
        assert!(!signals.take_zero_all());

        assert!(signals.request_zero_module(1));
        assert!(!signals.request_zero_module(5));
        assert!(!signals.take_zero_module(0));
        assert!(signals.take_zero_module(1));
        assert!(!signals.take_zero_module(1));

        signals.request_zero_gyro();
        assert!(signals.take_zero_gyro());
        assert!(!signals.take_zero_gyro());
    }
}
