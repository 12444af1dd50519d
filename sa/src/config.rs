//! SitAware configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use workthread::{DEFAULT_JOIN_WARN_FACTOR, WorkerConfig};

/// Main SitAware configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Worker thread timing
    pub workers: WorkersConfig,

    /// Data files loaded into the stores at startup
    pub data: DataConfig,

    /// Display surface
    pub display: DisplayConfig,

    /// Device link
    pub device: DeviceConfig,

    /// Single-instance guard
    pub instance: InstanceConfig,

    /// Shutdown behavior
    pub shutdown: ShutdownConfig,
}

impl Config {
    /// Load configuration, then restore the profile saved by the last shutdown
    ///
    /// An explicit path must load. Without one the first readable of
    /// `./.sitaware.yml` and `~/.config/sitaware/sitaware.yml` is used, else
    /// defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let base = match config_path {
            Some(path) => Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()))?,
            None => Self::discover(),
        };
        Ok(base.with_profile())
    }

    fn discover() -> Self {
        let candidates = [
            Some(PathBuf::from(".sitaware.yml")),
            dirs::config_dir().map(|dir| dir.join("sitaware").join("sitaware.yml")),
        ];
        for path in candidates.into_iter().flatten().filter(|p| p.exists()) {
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Config::discover: skipping"),
            }
        }
        tracing::info!("Config::discover: no config file, using defaults");
        Self::default()
    }

    /// Layer the saved profile over this config
    ///
    /// The profile carries settings only; file locations (`data`, `instance`)
    /// always come from the config that found it. An unreadable profile is
    /// logged and ignored.
    pub fn with_profile(self) -> Self {
        let path = self.profile_path();
        if !path.exists() {
            return self;
        }
        match Self::load_from_file(&path) {
            Ok(profile) => {
                tracing::info!(path = %path.display(), "Restored profile");
                Self {
                    data: self.data,
                    instance: self.instance,
                    ..profile
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{e:#}"), "Ignoring unreadable profile");
                self
            }
        }
    }

    /// Where [`Config::save`] writes the profile at shutdown
    pub fn profile_path(&self) -> PathBuf {
        self.data.resolve(&self.data.profile_file)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::debug!(path = %path.display(), "Config::load_from_file: parsed");
        Ok(config)
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Write the effective configuration so the next start can load it
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create profile directory")?;
        }
        fs::write(path, self.to_yaml()?).context(format!("Failed to write {}", path.display()))?;
        tracing::debug!("Saved profile to: {}", path.display());
        Ok(())
    }
}

/// Worker thread timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Render worker poll interval in milliseconds
    #[serde(rename = "render-ms")]
    pub render_ms: u64,

    /// Calculation worker poll interval in milliseconds
    #[serde(rename = "calculation-ms")]
    pub calculation_ms: u64,

    /// Instrument worker poll interval in milliseconds
    #[serde(rename = "instrument-ms")]
    pub instrument_ms: u64,

    /// Warn when a join takes longer than this many poll intervals
    #[serde(rename = "join-warn-factor")]
    pub join_warn_factor: u32,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            render_ms: 100,
            calculation_ms: 250,
            instrument_ms: 500,
            join_warn_factor: DEFAULT_JOIN_WARN_FACTOR,
        }
    }
}

impl WorkersConfig {
    pub fn render(&self) -> WorkerConfig {
        self.worker("render", self.render_ms)
    }

    pub fn calculation(&self) -> WorkerConfig {
        self.worker("calculation", self.calculation_ms)
    }

    pub fn instrument(&self) -> WorkerConfig {
        self.worker("instrument", self.instrument_ms)
    }

    fn worker(&self, name: &str, ms: u64) -> WorkerConfig {
        let poll = Duration::from_millis(ms.max(1));
        WorkerConfig::new(name, poll).with_join_warn_after(poll.saturating_mul(self.join_warn_factor.max(1)))
    }
}

/// Data files loaded into the stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Base directory for relative file names
    pub dir: PathBuf,

    pub waypoints: PathBuf,
    pub airspace: PathBuf,
    pub terrain: PathBuf,
    pub weather: PathBuf,
    pub topology: PathBuf,
    pub marks: PathBuf,

    /// Persisted derived state, restored at startup and saved at shutdown
    #[serde(rename = "persist-file")]
    pub persist_file: PathBuf,

    /// Settings written back at shutdown and restored by the next load
    #[serde(rename = "profile-file")]
    pub profile_file: PathBuf,

    /// Flight recorder output, appended to across runs
    #[serde(rename = "flight-log")]
    pub flight_log: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/sitaware on Linux)
        let dir = dirs::data_dir()
            .map(|d| d.join("sitaware"))
            .unwrap_or_else(|| PathBuf::from(".sitaware"));

        Self {
            dir,
            waypoints: PathBuf::from("waypoints.csv"),
            airspace: PathBuf::from("airspace.csv"),
            terrain: PathBuf::from("terrain.dat"),
            weather: PathBuf::from("weather.dat"),
            topology: PathBuf::from("topology.dat"),
            marks: PathBuf::from("marks.csv"),
            persist_file: PathBuf::from("persist.json"),
            profile_file: PathBuf::from("profile.yml"),
            flight_log: PathBuf::from("flight-log.csv"),
        }
    }
}

impl DataConfig {
    /// Resolve a data file against the base directory
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() { file.to_path_buf() } else { self.dir.join(file) }
    }

    /// Use `dir` as the base directory, keeping the file names
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Kind of display surface to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Status line redrawn in place on the controlling terminal
    Terminal,
    /// No output; frames are counted and kept in memory
    Headless,
}

/// Display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: DisplayMode,

    /// Window title, also used as the instance name in logs
    pub title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Terminal,
            title: "SitAware".to_string(),
        }
    }
}

/// Device link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Generate synthetic sensor samples instead of reading a device
    pub simulator: bool,

    /// Interval between samples pumped on the control thread, in milliseconds
    #[serde(rename = "sample-interval-ms")]
    pub sample_interval_ms: u64,

    /// Simulator start position
    #[serde(rename = "start-latitude")]
    pub start_latitude: f64,

    #[serde(rename = "start-longitude")]
    pub start_longitude: f64,

    #[serde(rename = "start-altitude")]
    pub start_altitude: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            simulator: true,
            sample_interval_ms: 1000,
            start_latitude: -36.55,
            start_longitude: 145.98,
            start_altitude: 1200.0,
        }
    }
}

impl DeviceConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

/// Single-instance guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// PID file of the running instance
    #[serde(rename = "pid-file")]
    pub pid_file: PathBuf,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        let pid_file = dirs::runtime_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("sitaware")
            .join("sitaware.pid");
        Self { pid_file }
    }
}

/// Shutdown configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Command handed control after teardown; the process exits instead of returning
    #[serde(rename = "handoff-command")]
    pub handoff_command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.workers.render_ms, 100);
        assert_eq!(config.workers.calculation_ms, 250);
        assert_eq!(config.workers.instrument_ms, 500);
        assert_eq!(config.display.mode, DisplayMode::Terminal);
        assert!(config.device.simulator);
        assert!(config.shutdown.handoff_command.is_none());
    }

    #[test]
    fn test_worker_configs_have_distinct_periods() {
        let workers = WorkersConfig::default();

        let render = workers.render();
        let calc = workers.calculation();
        let instrument = workers.instrument();

        assert_eq!(render.name, "render");
        assert_eq!(render.poll_interval, Duration::from_millis(100));
        assert_eq!(render.join_warn_after, Duration::from_millis(500));
        assert_ne!(calc.poll_interval, instrument.poll_interval);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

workers:
  render-ms: 50
  calculation-ms: 200
  instrument-ms: 1000
  join-warn-factor: 10

data:
  dir: /srv/sitaware
  weather: rasp.dat

display:
  mode: headless
  title: Test

device:
  simulator: false
  sample-interval-ms: 250

instance:
  pid-file: /tmp/test.pid

shutdown:
  handoff-command: "reboot-helper --now"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.workers.render_ms, 50);
        assert_eq!(config.workers.join_warn_factor, 10);
        assert_eq!(config.data.dir, PathBuf::from("/srv/sitaware"));
        assert_eq!(config.data.weather, PathBuf::from("rasp.dat"));
        assert_eq!(config.display.mode, DisplayMode::Headless);
        assert!(!config.device.simulator);
        assert_eq!(config.device.sample_interval(), Duration::from_millis(250));
        assert_eq!(config.instance.pid_file, PathBuf::from("/tmp/test.pid"));
        assert_eq!(config.shutdown.handoff_command.as_deref(), Some("reboot-helper --now"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
workers:
  render-ms: 40
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.workers.render_ms, 40);

        // Defaults for unspecified
        assert_eq!(config.workers.calculation_ms, 250);
        assert_eq!(config.data.waypoints, PathBuf::from("waypoints.csv"));
        assert_eq!(config.display.title, "SitAware");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let data = DataConfig::in_dir("/data");
        assert_eq!(data.resolve(&data.terrain), PathBuf::from("/data/terrain.dat"));
        assert_eq!(data.resolve(Path::new("/abs/file")), PathBuf::from("/abs/file"));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sa.yml");
        let yaml = format!("display:\n  mode: headless\ndata:\n  dir: {}\n", dir.path().display());
        fs::write(&path, yaml).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.display.mode, DisplayMode::Headless);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/sitaware.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("profile").join("sa.yml");
        let mut config = Config::default();
        config.data = DataConfig::in_dir(dir.path().join("data"));
        config.workers.render_ms = 33;

        config.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.workers.render_ms, 33);
    }

    #[test]
    fn test_yaml_roundtrip_keeps_kebab_keys() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("render-ms"));
        assert!(yaml.contains("pid-file"));
    }

    #[test]
    fn test_profile_restores_settings_but_keeps_locations() {
        let dir = tempfile::TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let path = dir.path().join("sa.yml");
        fs::write(
            &path,
            format!("data:\n  dir: {}\ninstance:\n  pid-file: /tmp/base.pid\n", data_dir.display()),
        )
        .unwrap();

        // What the last shutdown saved
        let mut saved = Config::load(Some(&path)).unwrap();
        saved.device.start_altitude = 1750.0;
        saved.workers.render_ms = 70;
        saved.instance.pid_file = PathBuf::from("/elsewhere/other.pid");
        saved.save(saved.profile_path()).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.device.start_altitude, 1750.0);
        assert_eq!(config.workers.render_ms, 70);
        assert_eq!(config.instance.pid_file, PathBuf::from("/tmp/base.pid"));
        assert_eq!(config.data.dir, data_dir);
    }

    #[test]
    fn test_unreadable_profile_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.data = DataConfig::in_dir(dir.path());
        config.workers.render_ms = 42;
        fs::write(config.profile_path(), "workers: [not, a, map]\n").unwrap();

        let config = config.with_profile();
        assert_eq!(config.workers.render_ms, 42);
    }

    #[test]
    fn test_huge_interval_saturates_join_warning() {
        let workers = WorkersConfig {
            render_ms: u64::MAX,
            join_warn_factor: u32::MAX,
            ..WorkersConfig::default()
        };
        let render = workers.render();
        assert_eq!(render.poll_interval, Duration::from_millis(u64::MAX));
        assert_eq!(render.join_warn_after, Duration::MAX);
    }
}
