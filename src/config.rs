// Loop timing, configuration keys and the typed swerve configuration
//
// The configuration is read once at startup from an external key/value store.
// Every key is optional; malformed values are reported, except for the
// joystick profile lists which fall back to the default curve.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::hardware::{PersistError, ZeroStore};
use crate::input::InputShaper;
use crate::input::curve::{DEFAULT_X_VALS, DEFAULT_Y_VALS};
use crate::messages::ModuleGeometry;
use crate::swerve::pid::{PidGains, ProfileConstraints};
use crate::swerve::{ChassisKinematics, SteeringConfig, ZeroOffset};

// Steering loop period (per module)
pub const STEER_LOOP_PERIOD: Duration = Duration::from_millis(5);

// Chassis loop period, 4x the steering period
pub const CHASSIS_LOOP_PERIOD: Duration = Duration::from_millis(20);

// Keys
pub const KEY_WIDTH: &str = "swerve_width";
pub const KEY_HEIGHT: &str = "swerve_height";
pub const KEY_MODULE_NAMES: &str = "swerve_module_names";
pub const KEY_STEERING_GEAR_RATIO: &str = "swerve_steering_gear_ratio";
pub const KEY_DRIVE_GEAR_RATIO: &str = "swerve_drive_gear_ratio";
pub const KEY_MAX_MOTOR_SPEED: &str = "swerve_max_motor_speed";
pub const KEY_ANGLE_KP: &str = "wheel_angle_kP";
pub const KEY_ANGLE_KI: &str = "wheel_angle_kI";
pub const KEY_ANGLE_KD: &str = "wheel_angle_kD";
pub const KEY_ANGLE_MAX_VELOCITY: &str = "wheel_angle_max_velocity";
pub const KEY_ANGLE_MAX_ACCELERATION: &str = "wheel_angle_max_acceleration";
pub const KEY_DEADBAND: &str = "joystick_deadband";
pub const KEY_PROFILE_X_VALS: &str = "joystick_profile_x_vals";
pub const KEY_PROFILE_Y_VALS: &str = "joystick_profile_y_vals";
pub const KEY_ROBOT_CENTRIC: &str = "robot_centric";
pub const KEY_HEADING_KP: &str = "heading_kP";

/// Key holding a module's persisted zero offset
pub fn offset_key(module: &str) -> String {
    format!("{}_offset", module)
}

/// Read access to the external key/value store
pub trait KeyValueStore {
    fn get_value(&self, key: &str) -> Option<String>;
}

impl KeyValueStore for HashMap<String, String> {
    fn get_value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl KeyValueStore for BTreeMap<String, String> {
    fn get_value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("config key {key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("module {module} needs {key} (no default position for this name)")]
    MissingPosition { module: String, key: String },

    #[error("no swerve modules configured")]
    NoModules,

    #[error("module name {0} is used twice")]
    DuplicateModule(String),

    #[error("config file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Flatten a JSON object into string values
///
/// Strings are taken as-is, numbers and booleans are stringified. Nested
/// values are rejected.
pub fn parse_json_store(text: &str) -> Result<BTreeMap<String, String>, String> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let object = value
        .as_object()
        .ok_or_else(|| "top level is not an object".to_string())?;

    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => return Err(format!("key {} has unsupported value {}", key, other)),
            };
            Ok((key.clone(), text))
        })
        .collect()
}

/// Key/value store backed by a flat JSON file
///
/// Zero offsets are written back into the same file.
#[derive(Debug, Clone)]
pub struct JsonConfigFile {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonConfigFile {
    /// Load `path`; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => parse_json_store(&text).map_err(|reason| ConfigError::File {
                path: path.display().to_string(),
                reason,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(ConfigError::File {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Ok(Self { path, values })
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

impl KeyValueStore for JsonConfigFile {
    fn get_value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl ZeroStore for JsonConfigFile {
    fn persist(&mut self, offsets: &[ZeroOffset]) -> Result<(), PersistError> {
        for offset in offsets {
            self.values
                .insert(offset_key(&offset.module), offset.offset.to_string());
        }
        let text = serde_json::to_string_pretty(&self.values)
            .map_err(|e| PersistError(e.to_string()))?;
        std::fs::write(&self.path, text).map_err(|e| {
            PersistError(format!("{}: {}", self.path.display(), e))
        })?;
        info!("Saved {} zero offsets to {}", offsets.len(), self.path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwerveConfig {
    pub width: f64,
    pub height: f64,
    pub modules: Vec<ModuleGeometry>,
    pub zero_offsets: Vec<ZeroOffset>,
    pub steering_gear_ratio: f64,
    pub drive_gear_ratio: f64,
    pub max_motor_speed: f64,
    pub angle_gains: PidGains,
    pub angle_constraints: ProfileConstraints,
    pub deadband: f64,
    pub profile_x_vals: String,
    pub profile_y_vals: String,
    pub robot_centric: bool,
    pub heading_kp: f64,
}

impl Default for SwerveConfig {
    fn default() -> Self {
        let (width, height) = (0.6, 0.6);
        let names = ["fr", "br", "bl", "fl"];
        Self {
            width,
            height,
            modules: names
                .iter()
                .filter_map(|name| {
                    corner_position(name, width, height)
                        .map(|(x, y)| ModuleGeometry::new(*name, x, y))
                })
                .collect(),
            zero_offsets: names
                .iter()
                .map(|name| ZeroOffset {
                    module: name.to_string(),
                    offset: 0.0,
                })
                .collect(),
            steering_gear_ratio: 1.0,
            drive_gear_ratio: 1.0,
            max_motor_speed: 600.0,
            angle_gains: PidGains {
                kp: 8.0,
                ki: 0.0,
                kd: 0.0,
            },
            angle_constraints: ProfileConstraints {
                max_velocity: 4.0 * PI,
                max_acceleration: 40.0 * PI,
            },
            deadband: crate::input::DEFAULT_DEADBAND,
            profile_x_vals: join(&DEFAULT_X_VALS),
            profile_y_vals: join(&DEFAULT_Y_VALS),
            robot_centric: false,
            heading_kp: 1.5,
        }
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Default position of the standard corner module names
/// (x to the right, y forward, chassis center at the origin)
fn corner_position(name: &str, width: f64, height: f64) -> Option<(f64, f64)> {
    let (hx, hy) = (width / 2.0, height / 2.0);
    match name {
        "fr" => Some((hx, hy)),
        "br" => Some((hx, -hy)),
        "bl" => Some((-hx, -hy)),
        "fl" => Some((-hx, hy)),
        _ => None,
    }
}

fn read_f64(store: &impl KeyValueStore, key: &str, default: f64) -> Result<f64, ConfigError> {
    match store.get_value(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(_) => Err(invalid(key, &value, "not a finite number")),
            Err(e) => Err(invalid(key, &value, &e.to_string())),
        },
    }
}

fn read_bool(store: &impl KeyValueStore, key: &str, default: bool) -> Result<bool, ConfigError> {
    match store.get_value(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<bool>()
            .map_err(|e| invalid(key, &value, &e.to_string())),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive(key: &str, value: f64) -> Result<f64, ConfigError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(key, &value.to_string(), "must be greater than zero"))
    }
}

impl SwerveConfig {
    /// Build the configuration from the external key/value store
    pub fn from_store(store: &impl KeyValueStore) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let width = read_f64(store, KEY_WIDTH, defaults.width)?;
        let height = read_f64(store, KEY_HEIGHT, defaults.height)?;

        let names: Vec<String> = match store.get_value(KEY_MODULE_NAMES) {
            Some(list) => list
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
            None => defaults.modules.iter().map(|m| m.name.clone()).collect(),
        };
        if names.is_empty() {
            return Err(ConfigError::NoModules);
        }

        let mut modules = Vec::with_capacity(names.len());
        let mut zero_offsets = Vec::with_capacity(names.len());
        for name in &names {
            if modules.iter().any(|m: &ModuleGeometry| &m.name == name) {
                return Err(ConfigError::DuplicateModule(name.clone()));
            }
            let x_key = format!("{}_x_pos", name);
            let y_key = format!("{}_y_pos", name);
            let corner = corner_position(name, width, height);
            let x = match (store.get_value(&x_key), corner) {
                (None, Some((x, _))) => x,
                (None, None) => {
                    return Err(ConfigError::MissingPosition {
                        module: name.clone(),
                        key: x_key,
                    });
                }
                (Some(_), _) => read_f64(store, &x_key, 0.0)?,
            };
            let y = match (store.get_value(&y_key), corner) {
                (None, Some((_, y))) => y,
                (None, None) => {
                    return Err(ConfigError::MissingPosition {
                        module: name.clone(),
                        key: y_key,
                    });
                }
                (Some(_), _) => read_f64(store, &y_key, 0.0)?,
            };
            modules.push(ModuleGeometry::new(name.clone(), x, y));
            zero_offsets.push(ZeroOffset {
                module: name.clone(),
                offset: read_f64(store, &offset_key(name), 0.0)?,
            });
        }

        let max_motor_speed = positive(
            KEY_MAX_MOTOR_SPEED,
            read_f64(store, KEY_MAX_MOTOR_SPEED, defaults.max_motor_speed)?,
        )?;
        let angle_constraints = ProfileConstraints {
            max_velocity: positive(
                KEY_ANGLE_MAX_VELOCITY,
                read_f64(
                    store,
                    KEY_ANGLE_MAX_VELOCITY,
                    defaults.angle_constraints.max_velocity,
                )?,
            )?,
            max_acceleration: positive(
                KEY_ANGLE_MAX_ACCELERATION,
                read_f64(
                    store,
                    KEY_ANGLE_MAX_ACCELERATION,
                    defaults.angle_constraints.max_acceleration,
                )?,
            )?,
        };

        Ok(Self {
            width,
            height,
            modules,
            zero_offsets,
            steering_gear_ratio: read_f64(
                store,
                KEY_STEERING_GEAR_RATIO,
                defaults.steering_gear_ratio,
            )?,
            drive_gear_ratio: read_f64(store, KEY_DRIVE_GEAR_RATIO, defaults.drive_gear_ratio)?,
            max_motor_speed,
            angle_gains: PidGains {
                kp: read_f64(store, KEY_ANGLE_KP, defaults.angle_gains.kp)?,
                ki: read_f64(store, KEY_ANGLE_KI, defaults.angle_gains.ki)?,
                kd: read_f64(store, KEY_ANGLE_KD, defaults.angle_gains.kd)?,
            },
            angle_constraints,
            deadband: read_f64(store, KEY_DEADBAND, defaults.deadband)?,
            // parsed later by the shaper, which falls back instead of failing
            profile_x_vals: store
                .get_value(KEY_PROFILE_X_VALS)
                .unwrap_or(defaults.profile_x_vals),
            profile_y_vals: store
                .get_value(KEY_PROFILE_Y_VALS)
                .unwrap_or(defaults.profile_y_vals),
            robot_centric: read_bool(store, KEY_ROBOT_CENTRIC, defaults.robot_centric)?,
            heading_kp: read_f64(store, KEY_HEADING_KP, defaults.heading_kp)?,
        })
    }

    pub fn steering_config(&self) -> SteeringConfig {
        SteeringConfig {
            steering_gear_ratio: self.steering_gear_ratio,
            drive_gear_ratio: self.drive_gear_ratio,
            max_motor_speed: self.max_motor_speed,
            gains: self.angle_gains,
            constraints: self.angle_constraints,
            period: STEER_LOOP_PERIOD.as_secs_f64(),
        }
    }

    pub fn kinematics(&self) -> ChassisKinematics {
        ChassisKinematics::new(self.width, self.height, self.modules.clone())
    }

    pub fn input_shaper(&self) -> InputShaper {
        InputShaper::from_config(self.deadband, &self.profile_x_vals, &self.profile_y_vals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_store_gives_defaults() {
        let cfg = SwerveConfig::from_store(&store(&[])).unwrap();
        assert_eq!(cfg, SwerveConfig::default());
        assert_eq!(cfg.modules.len(), 4);
        assert_eq!(cfg.modules[0], ModuleGeometry::new("fr", 0.3, 0.3));
    }

    #[test]
    fn test_overrides_are_applied() {
        let cfg = SwerveConfig::from_store(&store(&[
            (KEY_WIDTH, "0.5"),
            (KEY_HEIGHT, "0.7"),
            (KEY_MAX_MOTOR_SPEED, "400"),
            (KEY_ANGLE_KP, " 3.5 "),
            (KEY_ROBOT_CENTRIC, "true"),
            ("fl_offset", "0.125"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_motor_speed, 400.0);
        assert_eq!(cfg.angle_gains.kp, 3.5);
        assert!(cfg.robot_centric);
        assert_eq!(cfg.modules[3], ModuleGeometry::new("fl", -0.25, 0.35));
        assert_eq!(cfg.zero_offsets[3].offset, 0.125);
    }

    #[test]
    fn test_custom_module_names_need_positions() {
        let names = store(&[(KEY_MODULE_NAMES, "left,right")]);
        let err = SwerveConfig::from_store(&names).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPosition { .. }));

        let cfg = SwerveConfig::from_store(&store(&[
            (KEY_MODULE_NAMES, "solo"),
            ("solo_x_pos", "0"),
            ("solo_y_pos", "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.modules, vec![ModuleGeometry::new("solo", 0.0, 0.0)]);
    }

    #[test]
    fn test_malformed_number_is_an_error() {
        let err = SwerveConfig::from_store(&store(&[(KEY_ANGLE_KD, "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == KEY_ANGLE_KD));
        assert!(SwerveConfig::from_store(&store(&[(KEY_MAX_MOTOR_SPEED, "0")])).is_err());
        assert!(SwerveConfig::from_store(&store(&[(KEY_WIDTH, "NaN")])).is_err());
    }

    #[test]
    fn test_duplicate_and_empty_module_lists() {
        assert_eq!(
            SwerveConfig::from_store(&store(&[(KEY_MODULE_NAMES, "fr,fr")])),
            Err(ConfigError::DuplicateModule("fr".to_string()))
        );
        assert_eq!(
            SwerveConfig::from_store(&store(&[(KEY_MODULE_NAMES, " , ")])),
            Err(ConfigError::NoModules)
        );
    }

    #[test]
    fn test_bad_profile_lists_do_not_fail_startup() {
        let cfg = SwerveConfig::from_store(&store(&[
            (KEY_PROFILE_X_VALS, "a,b"),
            (KEY_PROFILE_Y_VALS, "0,1"),
        ]))
        .unwrap();
        let shaper = cfg.input_shaper();
        assert_eq!(shaper.faults().len(), 1);
    }

    #[test]
    fn test_json_values_are_stringified() {
        let text =
            r#"{"swerve_width": 0.5, "robot_centric": true, "swerve_module_names": "fr,bl"}"#;
        let values = parse_json_store(text).unwrap();
        assert_eq!(values["swerve_width"], "0.5");
        assert_eq!(values["robot_centric"], "true");
        let cfg = SwerveConfig::from_store(&values).unwrap();
        assert_eq!(cfg.width, 0.5);
        assert_eq!(cfg.modules.len(), 2);

        assert!(parse_json_store("[1, 2]").is_err());
        assert!(parse_json_store(r#"{"a": {"b": 1}}"#).is_err());
    }

    #[test]
    fn test_json_file_persists_offsets() {
        let path = std::env::temp_dir()
            .join(format!("diffswerve-config-{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let missing = JsonConfigFile::load(&path).unwrap();
        assert!(missing.values().is_empty());

        std::fs::write(&path, r#"{"swerve_width": 0.4, "fr_offset": 0.9}"#).unwrap();
        let mut file = JsonConfigFile::load(&path).unwrap();
        file.persist(&[ZeroOffset {
            module: "fr".to_string(),
            offset: 0.25,
        }])
        .unwrap();

        // offsets are replaced, other keys survive the rewrite
        let reloaded = JsonConfigFile::load(&path).unwrap();
        assert_eq!(reloaded.get_value("fr_offset").as_deref(), Some("0.25"));
        let cfg = SwerveConfig::from_store(&reloaded).unwrap();
        assert_eq!(cfg.width, 0.4);
        assert_eq!(cfg.zero_offsets[0].offset, 0.25);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_loop_ratio() {
        assert_eq!(CHASSIS_LOOP_PERIOD.as_millis() / STEER_LOOP_PERIOD.as_millis(), 4);
    }
}
