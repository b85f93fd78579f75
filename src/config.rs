use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub log_level: String,
    pub heuristics_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let heuristics_path = std::env::var("EVASION_HEURISTICS")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            database_url,
            log_level,
            heuristics_path,
        }
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }

    pub fn heuristics(&self) -> anyhow::Result<HeuristicConfig> {
        match &self.heuristics_path {
            Some(path) => HeuristicConfig::from_file(path),
            None => Ok(HeuristicConfig::default()),
        }
    }
}

/// Every weight and threshold the analytics use. Missing TOML keys keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct HeuristicConfig {
    pub trend: TrendConfig,
    pub scoring: ScoringConfig,
    pub recommendations: RecommendationConfig,
    pub report: ReportConfig,
    pub intervention: InterventionConfig,
    pub correlation: CorrelationConfig,
}

impl HeuristicConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read heuristics from {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid heuristics file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid heuristics file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let noise = self.correlation.noise;
        if !noise.is_finite() || noise < 0.0 {
            anyhow::bail!("correlation.noise must be a finite non-negative number, got {noise}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub slope_divisor: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { slope_divisor: 10.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub percentage_weight: f64,
    pub trend_weight: f64,
    pub streak_weight: f64,
    pub deficiency_weight: f64,
    pub trend_multiplier: f64,
    pub trend_cap: f64,
    pub streak_step: f64,
    pub streak_cap: f64,
    pub deficiency_step: f64,
    pub deficiency_cap: f64,
    pub neutral_score: f64,
    pub tiers: TierThresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            percentage_weight: 0.4,
            trend_weight: 0.3,
            streak_weight: 0.2,
            deficiency_weight: 0.1,
            trend_multiplier: 50.0,
            trend_cap: 50.0,
            streak_step: 10.0,
            streak_cap: 40.0,
            deficiency_step: 5.0,
            deficiency_cap: 30.0,
            neutral_score: 50.0,
            tiers: TierThresholds::default(),
        }
    }
}

/// Inclusive lower bounds of each tier.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            critical: 80.0,
            high: 60.0,
            medium: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub low_attendance_pct: f64,
    pub steep_decline_trend: f64,
    pub streak_alert: u32,
    pub max_items: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            low_attendance_pct: 60.0,
            steep_decline_trend: -0.3,
            streak_alert: 2,
            max_items: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub window_months: u32,
    pub min_periods: usize,
    pub streak_lookback: usize,
    pub default_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            window_months: 6,
            min_periods: 3,
            streak_lookback: 3,
            default_limit: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    pub preventive_trend: f64,
    pub critical_alert_count: usize,
    pub high_alert_count: usize,
    pub total_alert_count: usize,
}

impl Default for InterventionConfig {
    fn default() -> Self {
        Self {
            preventive_trend: -0.2,
            critical_alert_count: 5,
            high_alert_count: 10,
            total_alert_count: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Seed for the estimated-performance noise. Re-applied on every call.
    pub seed: u64,
    /// Noise is drawn uniformly from `-noise..=noise` on the 0..=10 scale.
    pub noise: f64,
    pub divergent_review_count: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            noise: 1.0,
            divergent_review_count: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: HeuristicConfig = toml::from_str(
            r#"
            [scoring]
            percentage_weight = 0.5

            [scoring.tiers]
            critical = 85.0

            [report]
            window_months = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.scoring.percentage_weight, 0.5);
        assert_eq!(config.scoring.trend_weight, 0.3);
        assert_eq!(config.scoring.tiers.critical, 85.0);
        assert_eq!(config.scoring.tiers.high, 60.0);
        assert_eq!(config.report.window_months, 12);
        assert_eq!(config.report.min_periods, 3);
        assert_eq!(config.trend, TrendConfig::default());
    }

    #[test]
    fn infinite_noise_is_rejected() {
        let config: HeuristicConfig = toml::from_str("[correlation]\nnoise = inf\n").unwrap();
        assert!(config.correlation.noise.is_infinite());
        assert!(config.validate().is_err());
        assert!(HeuristicConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_toml_is_the_default_config() {
        let config: HeuristicConfig = toml::from_str("").unwrap();
        assert_eq!(config, HeuristicConfig::default());
    }
}
