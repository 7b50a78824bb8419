//! Engine configuration.
//!
//! Per-form options are layered over process-wide defaults. Options arrive
//! either as a bare slice name or as an object:
//!
//! ```
//! use formsync::config::{FormOptions, SyncConfig, SyncDefaults, UpdateOn};
//!
//! let options = FormOptions::from_json(&serde_json::json!({
//!     "slice": "profile",
//!     "debounceTime": 250,
//!     "updateOn": "blur"
//! }))
//! .unwrap();
//! let config = SyncConfig::resolve(&SyncDefaults::default(), options).unwrap();
//! assert_eq!(config.slice, "profile");
//! assert_eq!(config.update_on, UpdateOn::Blur);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::ResetMode;
use crate::error::ConfigurationError;

/// Default sampling interval for form-to-store writes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Which interaction triggers a form-to-store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateOn {
    /// Every value change, sampled at the debounce interval.
    #[default]
    Change,
    /// Control blur.
    Blur,
    /// Successful submit only.
    Submit,
}

impl fmt::Display for UpdateOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Change => "change",
            Self::Blur => "blur",
            Self::Submit => "submit",
        })
    }
}

impl FromStr for UpdateOn {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "change" => Ok(Self::Change),
            "blur" => Ok(Self::Blur),
            "submit" => Ok(Self::Submit),
            other => Err(ConfigurationError::InvalidUpdateOn {
                value: other.to_string(),
            }),
        }
    }
}

/// Process-wide defaults applied to every mounted form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDefaults {
    pub debounce: Duration,
    pub update_on: UpdateOn,
    pub reset_on_destroy: Option<ResetMode>,
}

impl Default for SyncDefaults {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            update_on: UpdateOn::Change,
            reset_on_destroy: None,
        }
    }
}

impl SyncDefaults {
    pub const ENV_DEBOUNCE_MS: &'static str = "FORMSYNC_DEBOUNCE_MS";
    pub const ENV_UPDATE_ON: &'static str = "FORMSYNC_UPDATE_ON";
    pub const ENV_RESET_ON_DESTROY: &'static str = "FORMSYNC_RESET_ON_DESTROY";

    /// Defaults overridden by `FORMSYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let mut defaults = Self::default();

        if let Some(raw) = lookup(Self::ENV_DEBOUNCE_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| ConfigurationError::InvalidOptions {
                reason: format!("{} must be an integer, got '{raw}'", Self::ENV_DEBOUNCE_MS),
            })?;
            defaults.debounce = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(Self::ENV_UPDATE_ON) {
            defaults.update_on = raw.parse()?;
        }
        if let Some(raw) = lookup(Self::ENV_RESET_ON_DESTROY) {
            defaults.reset_on_destroy = Some(raw.parse()?);
        }

        Ok(defaults)
    }
}

/// Object form of per-form options.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormOptionsSpec {
    #[serde(default)]
    pub slice: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub debounce_time: Option<u64>,
    #[serde(default)]
    pub update_on: Option<UpdateOn>,
    #[serde(default)]
    pub reset_on_destroy: Option<String>,
}

/// Per-form options: a bare slice name or a full options object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormOptions {
    Slice(String),
    Detailed(FormOptionsSpec),
}

impl FormOptions {
    pub fn from_json(value: &Value) -> Result<Self, ConfigurationError> {
        serde_json::from_value(value.clone()).map_err(|e| ConfigurationError::InvalidOptions {
            reason: e.to_string(),
        })
    }
}

impl From<&str> for FormOptions {
    fn from(slice: &str) -> Self {
        Self::Slice(slice.to_string())
    }
}

impl From<FormOptionsSpec> for FormOptions {
    fn from(spec: FormOptionsSpec) -> Self {
        Self::Detailed(spec)
    }
}

/// Resolved configuration of one mounted form.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub slice: String,
    pub debounce: Duration,
    pub update_on: UpdateOn,
    pub reset_on_destroy: Option<ResetMode>,
}

impl SyncConfig {
    /// Configuration for `slice` with the built-in defaults.
    #[must_use]
    pub fn new(slice: impl Into<String>) -> Self {
        let defaults = SyncDefaults::default();
        Self {
            slice: slice.into(),
            debounce: defaults.debounce,
            update_on: defaults.update_on,
            reset_on_destroy: defaults.reset_on_destroy,
        }
    }

    /// Overlays `options` on `defaults`.
    pub fn resolve(defaults: &SyncDefaults, options: FormOptions) -> Result<Self, ConfigurationError> {
        let mut config = Self {
            slice: String::new(),
            debounce: defaults.debounce,
            update_on: defaults.update_on,
            reset_on_destroy: defaults.reset_on_destroy,
        };

        match options {
            FormOptions::Slice(slice) => config.slice = slice,
            FormOptions::Detailed(spec) => {
                config.slice = spec.slice.unwrap_or_default();
                if let Some(ms) = spec.debounce_time {
                    config.debounce = Duration::from_millis(ms);
                }
                if let Some(update_on) = spec.update_on {
                    config.update_on = update_on;
                }
                if let Some(mode) = spec.reset_on_destroy {
                    config.reset_on_destroy = Some(mode.parse()?);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.slice.trim().is_empty() {
            return Err(ConfigurationError::MissingSlice);
        }
        Ok(())
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_update_on(mut self, update_on: UpdateOn) -> Self {
        self.update_on = update_on;
        self
    }

    #[must_use]
    pub fn with_reset_on_destroy(mut self, mode: ResetMode) -> Self {
        self.reset_on_destroy = Some(mode);
        self
    }
}

/// Worker runtime settings.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Max queued control messages (shutdown requests).
    pub control_queue_capacity: usize,
    /// How long unmount waits for the worker to hand the engine back.
    pub shutdown_timeout: Duration,
    /// Max undelivered worker failures; further ones are counted and dropped.
    pub failure_queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control_queue_capacity: 16,
            shutdown_timeout: Duration::from_secs(5),
            failure_queue_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_bare_slice() {
        let config = SyncConfig::resolve(&SyncDefaults::default(), "profile".into()).unwrap();
        assert_eq!(config, SyncConfig::new("profile"));
        assert_eq!(config.debounce, DEFAULT_DEBOUNCE);
    }

    #[test]
    fn test_resolve_object_overrides_defaults() {
        let defaults = SyncDefaults {
            debounce: Duration::from_millis(10),
            update_on: UpdateOn::Blur,
            reset_on_destroy: None,
        };
        let options = FormOptions::from_json(&json!({
            "slice": "hero",
            "resetOnDestroy": "initial"
        }))
        .unwrap();
        let config = SyncConfig::resolve(&defaults, options).unwrap();
        assert_eq!(config.slice, "hero");
        assert_eq!(config.debounce, Duration::from_millis(10));
        assert_eq!(config.update_on, UpdateOn::Blur);
        assert_eq!(config.reset_on_destroy, Some(ResetMode::Initial));
    }

    #[test]
    fn test_resolve_missing_slice() {
        let options = FormOptions::from_json(&json!({"debounceTime": 5})).unwrap();
        assert_eq!(
            SyncConfig::resolve(&SyncDefaults::default(), options),
            Err(ConfigurationError::MissingSlice)
        );
        assert_eq!(
            SyncConfig::resolve(&SyncDefaults::default(), "  ".into()),
            Err(ConfigurationError::MissingSlice)
        );
    }

    #[test]
    fn test_resolve_bad_reset_mode() {
        let options = FormOptions::from_json(&json!({"slice": "p", "resetOnDestroy": "all"})).unwrap();
        assert!(matches!(
            SyncConfig::resolve(&SyncDefaults::default(), options),
            Err(ConfigurationError::InvalidResetMode { .. })
        ));
    }

    #[test]
    fn test_options_reject_bad_update_on() {
        assert!(FormOptions::from_json(&json!({"slice": "p", "updateOn": "hover"})).is_err());
        assert!(FormOptions::from_json(&json!(42)).is_err());
    }

    #[test]
    fn test_defaults_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            (SyncDefaults::ENV_DEBOUNCE_MS, "40"),
            (SyncDefaults::ENV_UPDATE_ON, "submit"),
            (SyncDefaults::ENV_RESET_ON_DESTROY, "blank"),
        ]);
        let defaults = SyncDefaults::from_lookup(|k| env.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(defaults.debounce, Duration::from_millis(40));
        assert_eq!(defaults.update_on, UpdateOn::Submit);
        assert_eq!(defaults.reset_on_destroy, Some(ResetMode::Blank));

        let bad = SyncDefaults::from_lookup(|k| (k == SyncDefaults::ENV_DEBOUNCE_MS).then(|| "soon".to_string()));
        assert!(matches!(bad, Err(ConfigurationError::InvalidOptions { .. })));
    }
}
