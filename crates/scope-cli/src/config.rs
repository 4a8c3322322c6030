//! Scope configuration – reads/writes `~/.scope/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scope_perception::ImuConfig;
use scope_runtime::TaskPeriods;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persisted configuration stored in `~/.scope/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Radar data-plane serial device.
    #[serde(default = "default_radar_port")]
    pub radar_port: PathBuf,

    /// Radar control-plane serial device; only used with `radar_profile`.
    #[serde(default = "default_radar_control_port")]
    pub radar_control_port: PathBuf,

    /// Chirp profile (`.cfg`) uploaded to the control port at start-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radar_profile: Option<PathBuf>,

    /// Sensor-board serial device (IMU + rotary encoder).
    #[serde(default = "default_sensor_port")]
    pub sensor_port: PathBuf,

    #[serde(default = "default_calibration_path")]
    pub calibration_path: PathBuf,

    /// Measure the gyro's resting offset before aiming starts. The scope
    /// must be held still for about ten seconds.
    #[serde(default = "default_true")]
    pub calibrate_imu_on_boot: bool,

    /// When set, every radar point is appended to this CSV file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radar_dump: Option<PathBuf>,

    #[serde(default = "default_reopen_delay_ms")]
    pub link_reopen_delay_ms: u64,

    #[serde(default = "default_radar_period_us")]
    pub radar_period_us: u64,
    #[serde(default = "default_imu_period_us")]
    pub imu_period_us: u64,
    #[serde(default = "default_aim_period_us")]
    pub aim_period_us: u64,

    /// IMU samples with any |acceleration| above this are discarded.
    #[serde(default = "default_max_acceleration")]
    pub max_acceleration: f32,

    #[serde(default = "default_true")]
    pub invert_yaw: bool,
}

fn default_radar_port() -> PathBuf {
    PathBuf::from("/dev/ttyUSB1")
}
fn default_radar_control_port() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}
fn default_sensor_port() -> PathBuf {
    PathBuf::from("/dev/ttyACM1")
}
fn default_calibration_path() -> PathBuf {
    PathBuf::from("bullet_calibration.dat")
}
fn default_true() -> bool {
    true
}
fn default_reopen_delay_ms() -> u64 {
    3000
}
fn default_radar_period_us() -> u64 {
    33_000
}
fn default_imu_period_us() -> u64 {
    1250
}
fn default_aim_period_us() -> u64 {
    3333
}
fn default_max_acceleration() -> f32 {
    30.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radar_port: default_radar_port(),
            radar_control_port: default_radar_control_port(),
            radar_profile: None,
            sensor_port: default_sensor_port(),
            calibration_path: default_calibration_path(),
            calibrate_imu_on_boot: true,
            radar_dump: None,
            link_reopen_delay_ms: default_reopen_delay_ms(),
            radar_period_us: default_radar_period_us(),
            imu_period_us: default_imu_period_us(),
            aim_period_us: default_aim_period_us(),
            max_acceleration: default_max_acceleration(),
            invert_yaw: true,
        }
    }
}

impl Config {
    pub fn periods(&self) -> TaskPeriods {
        TaskPeriods {
            radar: Duration::from_micros(self.radar_period_us),
            imu: Duration::from_micros(self.imu_period_us),
            aim: Duration::from_micros(self.aim_period_us),
        }
    }

    pub fn imu(&self) -> ImuConfig {
        ImuConfig {
            max_acceleration: self.max_acceleration,
            invert_yaw: self.invert_yaw,
        }
    }

    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.link_reopen_delay_ms)
    }
}

/// Return the path to `~/.scope/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".scope").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SCOPE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SCOPE_RADAR_PORT` | `radar_port` |
/// | `SCOPE_SENSOR_PORT` | `sensor_port` |
/// | `SCOPE_CALIBRATION_PATH` | `calibration_path` |
/// | `SCOPE_CALIBRATE_IMU` | `calibrate_imu_on_boot` (`true`/`false`/`1`/`0`) |
/// | `SCOPE_RADAR_DUMP` | `radar_dump` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SCOPE_RADAR_PORT") {
        cfg.radar_port = v.into();
    }
    if let Ok(v) = std::env::var("SCOPE_SENSOR_PORT") {
        cfg.sensor_port = v.into();
    }
    if let Ok(v) = std::env::var("SCOPE_CALIBRATION_PATH") {
        cfg.calibration_path = v.into();
    }
    if let Ok(v) = std::env::var("SCOPE_CALIBRATE_IMU")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.calibrate_imu_on_boot = flag;
    }
    if let Ok(v) = std::env::var("SCOPE_RADAR_DUMP") {
        cfg.radar_dump = Some(v.into());
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Save the config to disk, creating `~/.scope/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source: io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(write_err)
}
