//! TOML-based company configuration.
//!
//! Two sections:
//! - `[tracking]`: buffers and timers driving the session engine
//! - `[policy]`: labor rules enforced by the conflict validator
//!
//! Stored at `~/.config/geoshift/config.toml`. Every field carries a serde
//! default so a partial file (or none at all) still yields a usable config.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigError;

/// What happens when a pending confirmation times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationExpiry {
    /// Auto-commit the clock-in at the original enter time.
    ClockIn,
    /// Treat the shift as missed.
    NoShow,
}

/// Per-company automatic tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Minutes before scheduled start during which monitoring arms and
    /// enter events count toward the shift.
    #[serde(default = "default_clock_in_buffer")]
    pub clock_in_buffer_minutes: i64,
    /// Minutes after scheduled end during which events still count.
    #[serde(default = "default_clock_out_buffer")]
    pub clock_out_buffer_minutes: i64,
    /// Delay after an exit event before committing a clock-out, to absorb
    /// brief signal loss.
    #[serde(default = "default_exit_grace")]
    pub exit_grace_minutes: i64,
    /// Whether an enter event needs explicit confirmation before clocking in.
    #[serde(default)]
    pub requires_confirmation: bool,
    /// How long a pending confirmation waits before `on_confirmation_expiry`
    /// applies.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_minutes: i64,
    #[serde(default = "default_confirmation_expiry")]
    pub on_confirmation_expiry: ConfirmationExpiry,
}

fn default_clock_in_buffer() -> i64 {
    10
}
fn default_clock_out_buffer() -> i64 {
    10
}
fn default_exit_grace() -> i64 {
    5
}
fn default_confirmation_timeout() -> i64 {
    5
}
fn default_confirmation_expiry() -> ConfirmationExpiry {
    ConfirmationExpiry::ClockIn
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            clock_in_buffer_minutes: default_clock_in_buffer(),
            clock_out_buffer_minutes: default_clock_out_buffer(),
            exit_grace_minutes: default_exit_grace(),
            requires_confirmation: false,
            confirmation_timeout_minutes: default_confirmation_timeout(),
            on_confirmation_expiry: default_confirmation_expiry(),
        }
    }
}

impl TrackingConfig {
    pub fn clock_in_buffer(&self) -> Duration {
        Duration::minutes(self.clock_in_buffer_minutes)
    }

    pub fn clock_out_buffer(&self) -> Duration {
        Duration::minutes(self.clock_out_buffer_minutes)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::minutes(self.exit_grace_minutes)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::minutes(self.confirmation_timeout_minutes)
    }
}

/// Labor-policy constraints checked by the validator and the overtime logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborPolicy {
    /// Minimum rest gap between consecutive shifts.
    #[serde(default = "default_min_break")]
    pub min_break_minutes: i64,
    /// Scheduled hours per calendar day above this raise a warning.
    #[serde(default = "default_max_daily")]
    pub max_daily_hours: f64,
    /// Scheduled hours per ISO week above this are an error.
    #[serde(default = "default_max_weekly")]
    pub max_weekly_hours: f64,
    /// Worked minutes past expected hours before the overtime flag sets.
    #[serde(default = "default_overtime_tolerance")]
    pub overtime_tolerance_minutes: i64,
    /// Worked hours that force the explicit overtime status.
    #[serde(default = "default_hard_cap")]
    pub hard_cap_hours: f64,
    /// Per-site concurrent headcount caps; sites absent here are unchecked.
    /// Overrides `JobSite.capacity` when both are set.
    #[serde(default)]
    pub site_capacity: HashMap<String, u32>,
}

fn default_min_break() -> i64 {
    30
}
fn default_max_daily() -> f64 {
    10.0
}
fn default_max_weekly() -> f64 {
    40.0
}
fn default_overtime_tolerance() -> i64 {
    15
}
fn default_hard_cap() -> f64 {
    12.0
}

impl Default for LaborPolicy {
    fn default() -> Self {
        Self {
            min_break_minutes: default_min_break(),
            max_daily_hours: default_max_daily(),
            max_weekly_hours: default_max_weekly(),
            overtime_tolerance_minutes: default_overtime_tolerance(),
            hard_cap_hours: default_hard_cap(),
            site_capacity: HashMap::new(),
        }
    }
}

impl LaborPolicy {
    pub fn overtime_tolerance(&self) -> Duration {
        Duration::minutes(self.overtime_tolerance_minutes)
    }

    /// Capacity for a site, preferring the policy override.
    pub fn capacity_for(&self, site: &crate::model::JobSite) -> Option<u32> {
        self.site_capacity
            .get(&site.site_id)
            .copied()
            .or(site.capacity)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub policy: LaborPolicy,
}

/// Config/data directory, honoring `GEOSHIFT_ENV=dev` for a separate dir.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("GEOSHIFT_ENV").unwrap_or_else(|_| "production".to_string());
    let dir = if env == "dev" {
        base_dir.join("geoshift-dev")
    } else {
        base_dir.join("geoshift")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing defaults on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path,
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Load from disk, falling back to defaults on any failure.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}
