//! End-to-end runs of the swerve runtime on simulated hardware.

use std::time::Duration;

use diffswerve_runtime::config::SwerveConfig;
use diffswerve_runtime::hardware::sim::{SimHandles, sim_hardware};
use diffswerve_runtime::hardware::{HardwareError, ModuleMotors};
use diffswerve_runtime::messages::{ControllerState, MotorPair, Pov, RuntimeHealth};
use diffswerve_runtime::runtime::{self, RuntimeError};
use diffswerve_runtime::swerve::math::positive_mod;

fn sim(config: &SwerveConfig) -> (diffswerve_runtime::hardware::Hardware, SimHandles) {
    let names: Vec<String> = config.modules.iter().map(|m| m.name.clone()).collect();
    sim_hardware(&names, config.steering_gear_ratio)
}

fn rotation_distance(a: f64, b: f64) -> f64 {
    let d = positive_mod(a - b, 1.0);
    d.min(1.0 - d)
}

/// Motor driver that crashes its steering task on the first command
struct PanickingMotors;

impl ModuleMotors for PanickingMotors {
    fn set_velocities(&mut self, _command: MotorPair) -> Result<(), HardwareError> {
        panic!("motor driver crashed");
    }

    fn disable(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wheels_converge_to_diagonal_azimuth() {
    let config = SwerveConfig::default();
    let (hardware, sim) = sim(&config);
    sim.input.set(ControllerState {
        left_x: 1.0,
        left_y: 1.0,
        ..Default::default()
    });

    let handle = runtime::start(config, hardware).unwrap();
    // forward-right is an eighth turn clockwise of forward
    let converged = wait_for(|| {
        sim.modules
            .iter()
            .all(|m| rotation_distance(m.azimuth(), 0.875) < 0.01)
    })
    .await;
    handle.stop().await.unwrap();

    let azimuths: Vec<f64> = sim.modules.iter().map(|m| m.azimuth()).collect();
    assert!(converged, "azimuths: {:?}", azimuths);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_motor_writes_after_stop() {
    let config = SwerveConfig::default();
    let (hardware, sim) = sim(&config);
    sim.input.set(ControllerState {
        left_y: 0.8,
        ..Default::default()
    });

    let handle = runtime::start(config, hardware).unwrap();
    assert!(wait_for(|| sim.modules.iter().all(|m| m.write_count() > 5)).await);
    let mut status = handle.subscribe_status();
    handle.stop().await.unwrap();

    let counts: Vec<usize> = sim.modules.iter().map(|m| m.write_count()).collect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for (module, count) in sim.modules.iter().zip(counts) {
        assert_eq!(module.write_count(), count);
        assert!(module.is_disabled());
        assert_eq!(module.motors().motor1, 0.0);
    }
    assert_eq!(status.borrow_and_update().health, RuntimeHealth::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_task_does_not_cut_stop_short() {
    let config = SwerveConfig::default();
    let (mut hardware, sim) = sim(&config);
    hardware.modules[0].motors = Box::new(PanickingMotors);

    let handle = runtime::start(config, hardware).unwrap();
    assert!(wait_for(|| sim.modules[1..].iter().all(|m| m.write_count() > 5)).await);
    let result = handle.stop().await;

    assert!(matches!(result, Err(RuntimeError::Task(_))));
    // the healthy modules were all joined and released before stop returned
    for module in &sim.modules[1..] {
        assert!(module.is_disabled());
    }
    let counts: Vec<usize> = sim.modules.iter().map(|m| m.write_count()).collect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    for (module, count) in sim.modules.iter().zip(counts) {
        assert_eq!(module.write_count(), count);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_all_persists_once() {
    let config = SwerveConfig::default();
    let (hardware, sim) = sim(&config);
    sim.modules[0].set_azimuth(2.25);
    sim.modules[3].set_azimuth(-0.1);

    let handle = runtime::start(config, hardware).unwrap();
    handle.request_zero_all();
    assert!(wait_for(|| sim.zero_store.history().len() == 1).await);

    // nothing else asked for a zero, so nothing else is saved
    tokio::time::sleep(Duration::from_millis(100)).await;
    let history = sim.zero_store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0][0].module, "fr");
    assert!((history[0][0].offset - 0.25).abs() < 0.01);
    assert!((history[0][3].offset - 0.9).abs() < 0.01);
    assert_eq!(handle.status().health, RuntimeHealth::Ok);

    assert!(handle.request_zero_module(1));
    assert!(!handle.request_zero_module(9));
    assert!(wait_for(|| sim.zero_store.history().len() == 2).await);
    handle.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_persist_failure_degrades_status() {
    let config = SwerveConfig::default();
    let (hardware, sim) = sim(&config);
    sim.zero_store.set_failing(true);

    let handle = runtime::start(config, hardware).unwrap();
    handle.request_zero_all();
    let degraded = wait_for(|| handle.status().health == RuntimeHealth::Degraded).await;
    let status = handle.status();
    handle.stop().await.unwrap();

    assert!(degraded);
    assert!(status.message.unwrap_or_default().contains("zero offsets"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bad_profile_update_falls_back_and_reports() {
    let config = SwerveConfig::default();
    let (hardware, _sim) = sim(&config);

    let handle = runtime::start(config, hardware).unwrap();
    handle.update_profile("0,x", "0,1");
    assert!(wait_for(|| handle.status().health == RuntimeHealth::Degraded).await);

    handle.update_profile("0,1", "0,1");
    assert!(wait_for(|| handle.status().health == RuntimeHealth::Ok).await);
    handle.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gyro_zero_and_robot_centric_in_status() {
    let config = SwerveConfig::default();
    let (hardware, sim) = sim(&config);
    sim.gyro.set_heading(0.7);

    let handle = runtime::start(config, hardware).unwrap();
    assert!(wait_for(|| (handle.status().heading - 0.7).abs() < 1e-12).await);

    handle.request_zero_gyro();
    handle.set_robot_centric(true);
    assert!(wait_for(|| {
        let status = handle.status();
        status.heading == 0.0 && status.robot_centric
    })
    .await);
    handle.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_heading_hold_commands_rotation() {
    let config = SwerveConfig::default();
    let (hardware, sim) = sim(&config);
    sim.input.set(ControllerState {
        pov: Pov::Right,
        ..Default::default()
    });

    let handle = runtime::start(config, hardware).unwrap();
    // a clockwise turn request spins the fr module's drive
    let spinning = wait_for(|| {
        let m = sim.modules[0].motors();
        (m.motor1 - m.motor2).abs() > 1e-3
    })
    .await;
    handle.stop().await.unwrap();
    assert!(spinning);
}

#[tokio::test]
async fn test_module_count_mismatch_is_rejected() {
    let config = SwerveConfig::default();
    let (hardware, _sim) = sim_hardware(&["fr".to_string()], 1.0);
    let result = runtime::start(config, hardware);
    assert!(matches!(
        result,
        Err(RuntimeError::ModuleCount {
            configured: 4,
            available: 1
        })
    ));
}
