use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOAD_WEIGHT: u8 = 50;
pub const DEFAULT_MONTHLY_CAP: u32 = 15;

/// Unversioned algorithm parameters as supplied by an administrator or the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmSettings {
    pub name: String,
    /// 0 = seniority only, 100 = load only.
    pub load_weight: u8,
    pub strict_mode: bool,
    pub monthly_cap: u32,
    pub allow_overrides: bool,
    pub respect_availability: bool,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            load_weight: DEFAULT_LOAD_WEIGHT,
            strict_mode: false,
            monthly_cap: DEFAULT_MONTHLY_CAP,
            allow_overrides: true,
            respect_availability: true,
        }
    }
}

impl AlgorithmSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.load_weight > 100 {
            return Err(format!(
                "load weight must be within 0..=100, found {}",
                self.load_weight
            ));
        }
        if self.monthly_cap == 0 {
            return Err("monthly cap must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Published, immutable configuration version. Audit entries reference `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub version: u32,
    pub name: String,
    pub load_weight: u8,
    pub strict_mode: bool,
    pub monthly_cap: u32,
    pub allow_overrides: bool,
    pub respect_availability: bool,
    pub published_at: DateTime<Utc>,
}

impl AlgorithmConfig {
    pub(crate) fn from_settings(
        version: u32,
        settings: AlgorithmSettings,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            name: settings.name,
            load_weight: settings.load_weight,
            strict_mode: settings.strict_mode,
            monthly_cap: settings.monthly_cap,
            allow_overrides: settings.allow_overrides,
            respect_availability: settings.respect_availability,
            published_at,
        }
    }

    pub fn weight(&self) -> f64 {
        f64::from(self.load_weight) / 100.0
    }
}
