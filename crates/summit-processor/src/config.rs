//! Configuration management
//!
//! Loaded once in `main` and handed to every processor. Layers, lowest
//! priority first: compiled defaults, an optional TOML file, then
//! `SUMMIT_`-prefixed environment variables (`SUMMIT_VOC__MATCH_TOLERANCE_SECS`).

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{Compound, Instrument, Standard, StandardGas};

// ============================================================================
// Database and Scheduling Constants
// ============================================================================

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://summit.sqlite";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default time between processor cycles (9 minutes).
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 540;

/// Default time between staleness checks.
pub const DEFAULT_FAULT_CHECK_INTERVAL_SECS: u64 = 540;

/// Default delay before the first cycle.
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 0;

/// Config file read when `SUMMIT_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "summit.toml";

// ============================================================================
// Instrument Constants
// ============================================================================

/// Log file to peak batch tolerance for the VOC instrument (40 minutes).
pub const DEFAULT_VOC_MATCH_TOLERANCE_SECS: i64 = 2400;

/// Run log to peak batch tolerance for the methane instrument (5 minutes).
pub const DEFAULT_METHANE_MATCH_TOLERANCE_SECS: i64 = 300;

/// Readings further apart than this start a new calibration event.
pub const DEFAULT_PICARRO_GAP_SECS: i64 = 60;

/// Trailing window of an event used for its statistics.
pub const DEFAULT_PICARRO_BACK_PERIOD_SECS: i64 = 20;

/// Events shorter than this never stabilized and are stored as dumps.
pub const DEFAULT_PICARRO_MIN_EVENT_SECS: i64 = 90;

/// Maximum distance between the low, high and mid events of one MasterCal.
pub const DEFAULT_PICARRO_MASTERCAL_WINDOW_SECS: i64 = 300;

pub const DEFAULT_VOC_STALE_HOURS: i64 = 8;
pub const DEFAULT_METHANE_STALE_HOURS: i64 = 5;
pub const DEFAULT_PICARRO_STALE_HOURS: i64 = 5;

/// Default webhook request timeout in seconds.
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub voc: VocConfig,
    pub methane: MethaneConfig,
    pub picarro: PicarroConfig,
    pub faults: FaultConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub cycle_interval_secs: u64,
    pub fault_check_interval_secs: u64,
    pub startup_delay_secs: u64,
}

/// Closed interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: f64,
    pub high: f64,
}

impl Bounds {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocConfig {
    /// Directory of 36-line LabView log files.
    pub log_dir: PathBuf,
    /// Append-only peak area log (VOC.LOG).
    pub pa_file: PathBuf,
    /// Tab-delimited response factor table.
    pub crf_file: PathBuf,
    /// Directory of daily housekeeping logs.
    pub daily_dir: PathBuf,
    pub match_tolerance_secs: i64,
    /// Acceptable range per log parameter, keyed by field name.
    pub log_bounds: BTreeMap<String, Bounds>,
    pub plot_range: Bounds,
}

impl VocConfig {
    pub fn match_tolerance(&self) -> Duration {
        Duration::seconds(self.match_tolerance_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethaneConfig {
    /// Directory of per-run sample logs.
    pub log_dir: PathBuf,
    /// Append-only peak area log (CH4.LOG).
    pub pa_file: PathBuf,
    pub match_tolerance_secs: i64,
    /// Standards seeded into the store on load.
    pub standards: Vec<Standard>,
    pub plot_range: Bounds,
}

impl MethaneConfig {
    pub fn match_tolerance(&self) -> Duration {
        Duration::seconds(self.match_tolerance_secs)
    }
}

/// Certified mixing ratios of one standard tank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CertifiedValues {
    pub co: f64,
    pub co2: f64,
    pub ch4: f64,
}

impl CertifiedValues {
    pub fn value(&self, compound: Compound) -> f64 {
        match compound {
            Compound::Co => self.co,
            Compound::Co2 => self.co2,
            Compound::Ch4 => self.ch4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicarroStandards {
    pub low: CertifiedValues,
    pub mid: CertifiedValues,
    pub high: CertifiedValues,
}

impl PicarroStandards {
    pub fn certified(&self, gas: StandardGas) -> &CertifiedValues {
        match gas {
            StandardGas::Low => &self.low,
            StandardGas::Mid => &self.mid,
            StandardGas::High => &self.high,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicarroPlotRanges {
    pub co: Bounds,
    pub co2: Bounds,
    pub ch4: Bounds,
}

impl PicarroPlotRanges {
    pub fn range(&self, compound: Compound) -> Bounds {
        match compound {
            Compound::Co => self.co,
            Compound::Co2 => self.co2,
            Compound::Ch4 => self.ch4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicarroConfig {
    pub data_dir: PathBuf,
    pub gap_secs: i64,
    pub back_period_secs: i64,
    pub min_event_secs: i64,
    pub mastercal_window_secs: i64,
    pub standards: PicarroStandards,
    pub plot_ranges: PicarroPlotRanges,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    pub voc_stale_hours: i64,
    pub methane_stale_hours: i64,
    pub picarro_stale_hours: i64,
}

impl FaultConfig {
    /// Age beyond which the instrument's newest record counts as stale.
    /// The daily log is never checked.
    pub fn stale_after(&self, instrument: Instrument) -> Option<Duration> {
        match instrument {
            Instrument::Voc => Some(Duration::hours(self.voc_stale_hours)),
            Instrument::Methane => Some(Duration::hours(self.methane_stale_hours)),
            Instrument::Picarro => Some(Duration::hours(self.picarro_stale_hours)),
            Instrument::Daily => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Notifications go to the log only when unset.
    pub webhook_url: Option<String>,
    pub recipients: Vec<String>,
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from `.env`, the config file and environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let path = std::env::var("SUMMIT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load with an explicit config file path. A missing file is not an error.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        }

        let config: Config = figment
            .merge(Env::prefixed("SUMMIT_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.schedule.cycle_interval_secs == 0 {
            anyhow::bail!("Cycle interval must be greater than 0");
        }

        if self.schedule.fault_check_interval_secs == 0 {
            anyhow::bail!("Fault check interval must be greater than 0");
        }

        if self.voc.match_tolerance_secs < 0 || self.methane.match_tolerance_secs < 0 {
            anyhow::bail!("Match tolerances cannot be negative");
        }

        let picarro = &self.picarro;
        if picarro.gap_secs <= 0 {
            anyhow::bail!("Picarro gap_secs must be greater than 0");
        }
        if picarro.back_period_secs <= 0 {
            anyhow::bail!("Picarro back_period_secs must be greater than 0");
        }
        if picarro.back_period_secs > picarro.min_event_secs {
            anyhow::bail!(
                "Picarro back_period_secs ({}) cannot exceed min_event_secs ({})",
                picarro.back_period_secs,
                picarro.min_event_secs
            );
        }

        for (name, bounds) in &self.voc.log_bounds {
            if bounds.low > bounds.high {
                anyhow::bail!(
                    "Log bound for {} has low ({}) above high ({})",
                    name,
                    bounds.low,
                    bounds.high
                );
            }
        }

        for standard in &self.methane.standards {
            if standard.date_start >= standard.date_end {
                anyhow::bail!("Standard {} has an empty validity interval", standard.name);
            }
        }

        if self.notify.recipients.is_empty() && self.notify.webhook_url.is_some() {
            tracing::warn!("Webhook configured without recipients");
        }

        Ok(())
    }
}

fn midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn default_log_bounds() -> BTreeMap<String, Bounds> {
    [
        ("sample_pressure1", Bounds::new(1.5, 2.65)),
        ("sample_pressure2", Bounds::new(6.5, 10.0)),
        ("gc_head_p", Bounds::new(5.0, 7.75)),
        ("gc_head_p1", Bounds::new(9.0, 13.0)),
        ("chamber_temp_start", Bounds::new(18.0, 30.0)),
        ("gc_start_temp", Bounds::new(34.0, 36.0)),
        ("gc_oven_temp", Bounds::new(34.0, 36.0)),
    ]
    .into_iter()
    .map(|(name, bounds)| (name.to_string(), bounds))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            schedule: ScheduleConfig {
                cycle_interval_secs: DEFAULT_CYCLE_INTERVAL_SECS,
                fault_check_interval_secs: DEFAULT_FAULT_CHECK_INTERVAL_SECS,
                startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
            },
            voc: VocConfig {
                log_dir: PathBuf::from("data/voc/logs"),
                pa_file: PathBuf::from("data/voc/VOC.LOG"),
                crf_file: PathBuf::from("data/voc/crfs.txt"),
                daily_dir: PathBuf::from("data/voc/daily"),
                match_tolerance_secs: DEFAULT_VOC_MATCH_TOLERANCE_SECS,
                log_bounds: default_log_bounds(),
                plot_range: Bounds::new(0.0, 10_000.0),
            },
            methane: MethaneConfig {
                log_dir: PathBuf::from("data/methane/logs"),
                pa_file: PathBuf::from("data/methane/CH4.LOG"),
                match_tolerance_secs: DEFAULT_METHANE_MATCH_TOLERANCE_SECS,
                standards: vec![Standard {
                    name: "ws_2019".to_string(),
                    mr: 2067.16,
                    date_start: midnight(2019, 1, 1),
                    date_end: midnight(2019, 6, 1),
                }],
                plot_range: Bounds::new(1800.0, 2150.0),
            },
            picarro: PicarroConfig {
                data_dir: PathBuf::from("data/picarro"),
                gap_secs: DEFAULT_PICARRO_GAP_SECS,
                back_period_secs: DEFAULT_PICARRO_BACK_PERIOD_SECS,
                min_event_secs: DEFAULT_PICARRO_MIN_EVENT_SECS,
                mastercal_window_secs: DEFAULT_PICARRO_MASTERCAL_WINDOW_SECS,
                standards: PicarroStandards {
                    low: CertifiedValues { co: 69.6, co2: 390.24, ch4: 1838.5 },
                    mid: CertifiedValues { co: 117.4, co2: 408.65, ch4: 1925.5 },
                    high: CertifiedValues { co: 174.6, co2: 428.53, ch4: 2050.6 },
                },
                plot_ranges: PicarroPlotRanges {
                    co: Bounds::new(0.0, 500.0),
                    co2: Bounds::new(350.0, 650.0),
                    ch4: Bounds::new(1800.0, 2800.0),
                },
            },
            faults: FaultConfig {
                voc_stale_hours: DEFAULT_VOC_STALE_HOURS,
                methane_stale_hours: DEFAULT_METHANE_STALE_HOURS,
                picarro_stale_hours: DEFAULT_PICARRO_STALE_HOURS,
            },
            notify: NotifyConfig {
                webhook_url: None,
                recipients: Vec::new(),
                timeout_secs: DEFAULT_NOTIFY_TIMEOUT_SECS,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.voc.match_tolerance(), Duration::minutes(40));
        assert_eq!(config.methane.match_tolerance(), Duration::minutes(5));
        assert_eq!(config.schedule.cycle_interval_secs, 540);
    }

    #[test]
    fn test_stale_thresholds() {
        let faults = Config::default().faults;
        assert_eq!(faults.stale_after(Instrument::Voc), Some(Duration::hours(8)));
        assert_eq!(faults.stale_after(Instrument::Picarro), Some(Duration::hours(5)));
        assert_eq!(faults.stale_after(Instrument::Daily), None);
    }

    #[test]
    fn test_validate_rejects_back_period_longer_than_event() {
        let mut config = Config::default();
        config.picarro.back_period_secs = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = Config::default();
        config
            .voc
            .log_bounds
            .insert("gc_head_p".to_string(), Bounds::new(8.0, 5.0));
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_file_and_env_layers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[voc]\nmatch_tolerance_secs = 1200\n\n[notify]\nrecipients = [\"ops@example.org\"]"
        )
        .unwrap();

        std::env::set_var("SUMMIT_METHANE__MATCH_TOLERANCE_SECS", "600");
        let config = Config::load_from(file.path()).unwrap();
        std::env::remove_var("SUMMIT_METHANE__MATCH_TOLERANCE_SECS");

        assert_eq!(config.voc.match_tolerance_secs, 1200);
        assert_eq!(config.methane.match_tolerance_secs, 600);
        assert_eq!(config.notify.recipients, vec!["ops@example.org".to_string()]);
        // untouched keys keep their defaults
        assert_eq!(config.picarro.gap_secs, DEFAULT_PICARRO_GAP_SECS);
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/summit.toml")).unwrap();
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
    }
}
