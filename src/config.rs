//! Configuration types for riskgate
//!
//! One validated configuration structure loaded once at startup. Thresholds the
//! source system scattered across env vars (Kelly fraction, breaker tiers,
//! staleness windows) live here, and `Config::validate` fails fast on
//! out-of-range values instead of silently clamping.

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {message}")]
    OutOfRange { field: &'static str, message: String },
}

fn range_err(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        message: message.into(),
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Position sizing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    /// Fractional Kelly multiplier (e.g. 0.25 for quarter Kelly)
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    /// Assumed payoff ratio (average win / average loss) for the Kelly edge
    #[serde(default = "default_payoff_ratio")]
    pub payoff_ratio: Decimal,
    /// Maximum position as fraction of equity
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: Decimal,
    /// Minimum trade notional in dollars
    #[serde(default = "default_min_size_floor")]
    pub min_size_floor: Decimal,
    /// Stop distance as a multiple of average true range
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: Decimal,
    /// Stop distance fallback (fraction of price) when volatility is degenerate
    #[serde(default = "default_fallback_stop_pct")]
    pub fallback_stop_pct: Decimal,
}

fn default_kelly_fraction() -> Decimal {
    Decimal::new(25, 2) // 0.25 = quarter Kelly
}
fn default_payoff_ratio() -> Decimal {
    Decimal::new(15, 1) // 1.5
}
fn default_max_position_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02 = 2%
}
fn default_min_size_floor() -> Decimal {
    Decimal::new(100, 0) // $100
}
fn default_atr_multiplier() -> Decimal {
    Decimal::new(2, 0)
}
fn default_fallback_stop_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            kelly_fraction: default_kelly_fraction(),
            payoff_ratio: default_payoff_ratio(),
            max_position_pct: default_max_position_pct(),
            min_size_floor: default_min_size_floor(),
            atr_multiplier: default_atr_multiplier(),
            fallback_stop_pct: default_fallback_stop_pct(),
        }
    }
}

/// VaR estimator selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    #[default]
    Parametric,
    Historical,
    MonteCarlo,
}

/// Portfolio risk validation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// VaR estimator to use
    #[serde(default)]
    pub var_method: VarMethod,
    /// VaR confidence level (e.g. 0.95)
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    /// VaR budget as fraction of equity
    #[serde(default = "default_var_budget_pct")]
    pub var_budget_pct: Decimal,
    /// Monte Carlo resampling iterations
    #[serde(default = "default_mc_iterations")]
    pub mc_iterations: usize,
    /// RNG seed for Monte Carlo resampling
    #[serde(default)]
    pub mc_seed: u64,
    /// Pairwise correlation above which positions count as one exposure cluster
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
    /// Maximum correlated-cluster exposure as fraction of equity
    #[serde(default = "default_max_correlated_pct")]
    pub max_correlated_pct: Decimal,
}

fn default_var_confidence() -> f64 {
    0.95
}
fn default_var_budget_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_mc_iterations() -> usize {
    2000
}
fn default_correlation_threshold() -> f64 {
    0.7
}
fn default_max_correlated_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            var_method: VarMethod::default(),
            var_confidence: default_var_confidence(),
            var_budget_pct: default_var_budget_pct(),
            mc_iterations: default_mc_iterations(),
            mc_seed: 0,
            correlation_threshold: default_correlation_threshold(),
            max_correlated_pct: default_max_correlated_pct(),
        }
    }
}

/// Circuit breaker tier thresholds (daily loss as fraction of equity)
#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_tier1_loss_pct")]
    pub tier1_loss_pct: Decimal,
    #[serde(default = "default_tier2_loss_pct")]
    pub tier2_loss_pct: Decimal,
    #[serde(default = "default_tier3_loss_pct")]
    pub tier3_loss_pct: Decimal,
    #[serde(default = "default_tier4_loss_pct")]
    pub tier4_loss_pct: Decimal,
    /// Volatility index level that forces TIER3 regardless of losses
    #[serde(default = "default_vol_spike_threshold")]
    pub vol_spike_threshold: Decimal,
    /// Candidate size multiplier applied at TIER1
    #[serde(default = "default_tier1_size_multiplier")]
    pub tier1_size_multiplier: Decimal,
    /// Path for the persisted breaker state record
    #[serde(default = "default_state_path")]
    pub state_path: std::path::PathBuf,
}

fn default_tier1_loss_pct() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_tier2_loss_pct() -> Decimal {
    Decimal::new(2, 2)
}
fn default_tier3_loss_pct() -> Decimal {
    Decimal::new(3, 2)
}
fn default_tier4_loss_pct() -> Decimal {
    Decimal::new(5, 2)
}
fn default_vol_spike_threshold() -> Decimal {
    Decimal::new(40, 0)
}
fn default_tier1_size_multiplier() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_state_path() -> std::path::PathBuf {
    std::path::PathBuf::from("breaker_state.json")
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            tier1_loss_pct: default_tier1_loss_pct(),
            tier2_loss_pct: default_tier2_loss_pct(),
            tier3_loss_pct: default_tier3_loss_pct(),
            tier4_loss_pct: default_tier4_loss_pct(),
            vol_spike_threshold: default_vol_spike_threshold(),
            tier1_size_multiplier: default_tier1_size_multiplier(),
            state_path: default_state_path(),
        }
    }
}

/// Snapshot staleness bands in hours (lower bound inclusive)
#[derive(Debug, Clone, Deserialize)]
pub struct StalenessConfig {
    #[serde(default = "default_fresh_max_hours")]
    pub fresh_max_hours: f64,
    #[serde(default = "default_aging_max_hours")]
    pub aging_max_hours: f64,
    #[serde(default = "default_stale_max_hours")]
    pub stale_max_hours: f64,
}

fn default_fresh_max_hours() -> f64 {
    24.0
}
fn default_aging_max_hours() -> f64 {
    48.0
}
fn default_stale_max_hours() -> f64 {
    72.0
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            fresh_max_hours: default_fresh_max_hours(),
            aging_max_hours: default_aging_max_hours(),
            stale_max_hours: default_stale_max_hours(),
        }
    }
}

/// Slippage model selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlippageMode {
    #[default]
    FixedBps,
    VolumeParticipation,
    VolatilityScaled,
}

/// Commission schedule selection
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommissionMode {
    PerShare,
    PerContract,
    #[default]
    Percentage,
}

/// Execution cost model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    #[serde(default)]
    pub slippage_mode: SlippageMode,
    /// Base slippage in basis points (fixed-bps mode, and floor for the others)
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: Decimal,
    /// Impact coefficient for the volume-participation model
    #[serde(default = "default_impact_coefficient")]
    pub impact_coefficient: f64,
    /// Slippage bps per unit of volatility for the volatility-scaled model
    #[serde(default = "default_vol_slippage_scale")]
    pub vol_slippage_scale: Decimal,
    #[serde(default)]
    pub commission_mode: CommissionMode,
    /// Commission rate: per share, per contract, or fraction of notional
    #[serde(default = "default_commission_rate")]
    pub commission_rate: Decimal,
    /// Explicit opt-in for a zero-cost model (misrepresents achievable returns)
    #[serde(default)]
    pub allow_zero_cost: bool,
}

fn default_slippage_bps() -> Decimal {
    Decimal::new(5, 0) // 5 bps
}
fn default_impact_coefficient() -> f64 {
    10.0
}
fn default_vol_slippage_scale() -> Decimal {
    Decimal::new(100, 0)
}
fn default_commission_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            slippage_mode: SlippageMode::default(),
            slippage_bps: default_slippage_bps(),
            impact_coefficient: default_impact_coefficient(),
            vol_slippage_scale: default_vol_slippage_scale(),
            commission_mode: CommissionMode::default(),
            commission_rate: default_commission_rate(),
            allow_zero_cost: false,
        }
    }
}

/// Backtest / walk-forward promotion thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Initial capital for simulations
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Minimum Sharpe ratio for a strategy to pass the promotion gate
    #[serde(default = "default_min_sharpe")]
    pub min_sharpe: f64,
    /// Out-of-sample Sharpe may drop at most this fraction below in-sample
    #[serde(default = "default_max_sharpe_decay")]
    pub max_sharpe_decay: f64,
    /// Bars per walk-forward training window
    #[serde(default = "default_train_bars")]
    pub train_bars: usize,
    /// Bars per walk-forward test window
    #[serde(default = "default_test_bars")]
    pub test_bars: usize,
}

fn default_initial_capital() -> Decimal {
    Decimal::new(100_000, 0)
}
fn default_min_sharpe() -> f64 {
    0.5
}
fn default_max_sharpe_decay() -> f64 {
    0.5
}
fn default_train_bars() -> usize {
    252
}
fn default_test_bars() -> usize {
    63
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            min_sharpe: default_min_sharpe(),
            max_sharpe_decay: default_max_sharpe_decay(),
            train_bars: default_train_bars(),
            test_bars: default_test_bars(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Range-check every threshold; rejects invalid values instead of clamping
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.sizing;
        if s.kelly_fraction <= Decimal::ZERO || s.kelly_fraction > Decimal::ONE {
            return Err(range_err(
                "sizing.kelly_fraction",
                format!("must be in (0, 1], got {}", s.kelly_fraction),
            ));
        }
        if s.payoff_ratio <= Decimal::ZERO {
            return Err(range_err(
                "sizing.payoff_ratio",
                format!("must be positive, got {}", s.payoff_ratio),
            ));
        }
        if s.max_position_pct <= Decimal::ZERO || s.max_position_pct > Decimal::ONE {
            return Err(range_err(
                "sizing.max_position_pct",
                format!("must be in (0, 1], got {}", s.max_position_pct),
            ));
        }
        if s.min_size_floor < Decimal::ZERO {
            return Err(range_err(
                "sizing.min_size_floor",
                format!("must be non-negative, got {}", s.min_size_floor),
            ));
        }
        if s.atr_multiplier <= Decimal::ZERO {
            return Err(range_err(
                "sizing.atr_multiplier",
                format!("must be positive, got {}", s.atr_multiplier),
            ));
        }
        if s.fallback_stop_pct <= Decimal::ZERO || s.fallback_stop_pct >= Decimal::ONE {
            return Err(range_err(
                "sizing.fallback_stop_pct",
                format!("must be in (0, 1), got {}", s.fallback_stop_pct),
            ));
        }

        let r = &self.risk;
        if r.var_confidence <= 0.5 || r.var_confidence >= 1.0 {
            return Err(range_err(
                "risk.var_confidence",
                format!("must be in (0.5, 1), got {}", r.var_confidence),
            ));
        }
        if r.var_budget_pct <= Decimal::ZERO || r.var_budget_pct > Decimal::ONE {
            return Err(range_err(
                "risk.var_budget_pct",
                format!("must be in (0, 1], got {}", r.var_budget_pct),
            ));
        }
        if r.mc_iterations == 0 {
            return Err(range_err("risk.mc_iterations", "must be positive"));
        }
        if !(0.0..=1.0).contains(&r.correlation_threshold) {
            return Err(range_err(
                "risk.correlation_threshold",
                format!("must be in [0, 1], got {}", r.correlation_threshold),
            ));
        }
        if r.max_correlated_pct <= Decimal::ZERO || r.max_correlated_pct > Decimal::ONE {
            return Err(range_err(
                "risk.max_correlated_pct",
                format!("must be in (0, 1], got {}", r.max_correlated_pct),
            ));
        }

        let b = &self.breaker;
        let tiers = [
            b.tier1_loss_pct,
            b.tier2_loss_pct,
            b.tier3_loss_pct,
            b.tier4_loss_pct,
        ];
        if tiers.iter().any(|t| *t <= Decimal::ZERO) {
            return Err(range_err("breaker", "tier thresholds must be positive"));
        }
        if !tiers.windows(2).all(|w| w[0] < w[1]) {
            return Err(range_err(
                "breaker",
                "tier thresholds must be strictly increasing",
            ));
        }
        if b.tier1_size_multiplier <= Decimal::ZERO || b.tier1_size_multiplier >= Decimal::ONE {
            return Err(range_err(
                "breaker.tier1_size_multiplier",
                format!("must be in (0, 1), got {}", b.tier1_size_multiplier),
            ));
        }

        let st = &self.staleness;
        if st.fresh_max_hours <= 0.0
            || st.fresh_max_hours >= st.aging_max_hours
            || st.aging_max_hours >= st.stale_max_hours
        {
            return Err(range_err(
                "staleness",
                "band bounds must be positive and strictly increasing",
            ));
        }

        let c = &self.cost;
        if !c.allow_zero_cost
            && c.slippage_bps <= Decimal::ZERO
            && c.commission_rate <= Decimal::ZERO
        {
            return Err(range_err(
                "cost",
                "zero-cost model requires allow_zero_cost = true",
            ));
        }

        let v = &self.validation;
        if v.initial_capital <= Decimal::ZERO {
            return Err(range_err("validation.initial_capital", "must be positive"));
        }
        if v.train_bars == 0 || v.test_bars == 0 {
            return Err(range_err(
                "validation",
                "train_bars and test_bars must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&v.max_sharpe_decay) {
            return Err(range_err(
                "validation.max_sharpe_decay",
                format!("must be in [0, 1], got {}", v.max_sharpe_decay),
            ));
        }

        Ok(())
    }
}
