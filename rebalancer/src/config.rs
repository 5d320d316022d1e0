//! TOML configuration loading and validation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::blender::ModelMix;
use crate::error::{Error, Result};
use crate::fx::{FxConfig, OrderType as FxOrderType};
use crate::planner::{Bands, PlannerOpts, TriggerMode};
use crate::pricer::{EscalateAction, LimitsConfig, Style as PricerStyle};
use rebalancer_core::bps;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub account: AccountConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
    pub cost: CostConfig,
    pub logging: LoggingConfig,
    pub models: ModelsConfig,
    pub rebalance: RebalanceConfig,
    pub fx: FxTomlConfig,
    pub pricing: PricingConfig,
    pub limits: LimitsTomlConfig,
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Cash,
    Margin,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_interval")]
    pub order_interval_ms: u64,
    #[serde(default = "default_offset")]
    pub limit_offset_bps: u32,
    #[serde(default = "default_order_timeout")]
    pub order_timeout_secs: u64,
    #[serde(default = "default_max_orders")]
    pub max_orders_per_run: usize,
    /// Orders submitted at once within a sequencing group; `0` means
    /// unbounded (submit the whole group in one shot).
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
}

fn default_interval() -> u64 {
    100
}
fn default_offset() -> u32 {
    5
}
fn default_order_timeout() -> u64 {
    300
}
fn default_max_orders() -> usize {
    50
}
fn default_concurrency_cap() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_max_position")]
    pub max_position_pct: f64,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    #[serde(default = "default_min_trade")]
    pub min_trade_usd: f64,
    #[serde(default = "default_max_trade")]
    pub max_trade_usd: f64,
    #[serde(default = "default_true")]
    pub allow_short: bool,
    #[serde(default = "default_max_short")]
    pub max_short_pct: f64,
}

fn default_max_position() -> f64 {
    0.25
}
fn default_max_leverage() -> f64 {
    1.5
}
fn default_min_trade() -> f64 {
    100.0
}
fn default_max_trade() -> f64 {
    100_000.0
}
fn default_true() -> bool {
    true
}
fn default_max_short() -> f64 {
    0.30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_commission")]
    pub commission_per_share: f64,
    #[serde(default = "default_commission_min")]
    pub commission_min: f64,
    #[serde(default = "default_slippage")]
    pub slippage_bps: u32,
}

fn default_commission() -> f64 {
    0.0035
}
fn default_commission_min() -> f64 {
    0.35
}
fn default_slippage() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

/// Static mix of the three named model portfolios (design notes §6 `models`).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub smurf: f64,
    pub badass: f64,
    pub gltr: f64,
}

impl ModelsConfig {
    pub fn to_mix(&self) -> Result<ModelMix> {
        let mix = ModelMix {
            smurf: self.smurf,
            badass: self.badass,
            gltr: self.gltr,
        };
        mix.validate()?;
        Ok(mix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerModeCfg {
    PerHolding,
    TotalDrift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquityOrderTypeCfg {
    Market,
    Limit,
}

/// Rebalance planner configuration (design notes §6 `rebalance`).
#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceConfig {
    pub trigger_mode: TriggerModeCfg,
    #[serde(default = "default_per_holding_band_bps")]
    pub per_holding_band_bps: f64,
    #[serde(default = "default_portfolio_total_band_bps")]
    pub portfolio_total_band_bps: f64,
    #[serde(default = "default_min_order_usd")]
    pub min_order_usd: f64,
    /// Percent `[0, 100]` at this boundary; converted to a `[0, 1]` fraction
    /// by [`RebalanceConfig::cash_buffer_fraction`].
    #[serde(default)]
    pub cash_buffer_pct: f64,
    #[serde(default)]
    pub maintenance_buffer_pct: f64,
    #[serde(default)]
    pub allow_fractional: bool,
    #[serde(default = "default_true")]
    pub allow_margin: bool,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: f64,
    #[serde(default = "default_true")]
    pub prefer_rth: bool,
    #[serde(default = "default_equity_order_type")]
    pub order_type: EquityOrderTypeCfg,
}

fn default_per_holding_band_bps() -> f64 {
    200.0
}
fn default_portfolio_total_band_bps() -> f64 {
    500.0
}
fn default_min_order_usd() -> f64 {
    100.0
}
fn default_equity_order_type() -> EquityOrderTypeCfg {
    EquityOrderTypeCfg::Limit
}

impl RebalanceConfig {
    pub fn cash_buffer_fraction(&self) -> f64 {
        self.cash_buffer_pct / 100.0
    }

    pub fn maintenance_buffer_fraction(&self) -> f64 {
        self.maintenance_buffer_pct / 100.0
    }

    pub fn to_planner_opts(&self) -> PlannerOpts {
        PlannerOpts {
            bands: Bands::Scalar(bps::to_fraction(self.per_holding_band_bps)),
            min_order: self.min_order_usd,
            max_leverage: if self.allow_margin { self.max_leverage } else { 1.0 },
            cash_buffer_pct: self.cash_buffer_fraction(),
            maintenance_buffer_pct: self.maintenance_buffer_fraction(),
            allow_fractional: self.allow_fractional,
            trigger_mode: match self.trigger_mode {
                TriggerModeCfg::PerHolding => TriggerMode::PerHolding,
                TriggerModeCfg::TotalDrift => TriggerMode::TotalDrift,
            },
            portfolio_total_band_bps: self.portfolio_total_band_bps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FxConvertMode {
    JustInTime,
    AlwaysTopUp,
}

/// FX sizing engine configuration (design notes §6 `fx`).
#[derive(Debug, Clone, Deserialize)]
pub struct FxTomlConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default)]
    pub funding_currencies: Vec<String>,
    #[serde(default = "default_convert_mode")]
    pub convert_mode: FxConvertMode,
    #[serde(default = "default_true")]
    pub use_mid_for_planning: bool,
    #[serde(default = "default_min_fx_order_usd")]
    pub min_fx_order_usd: f64,
    #[serde(default)]
    pub max_fx_order_usd: Option<f64>,
    #[serde(default = "default_fx_buffer_bps")]
    pub fx_buffer_bps: f64,
    #[serde(default = "default_fx_order_type")]
    pub order_type: EquityOrderTypeCfg,
    #[serde(default = "default_limit_slippage_bps")]
    pub limit_slippage_bps: f64,
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default = "default_wait_for_fill_seconds")]
    pub wait_for_fill_seconds: u64,
    #[serde(default = "default_true")]
    pub prefer_market_hours: bool,
    #[serde(default = "default_stale_quote_seconds")]
    pub stale_quote_seconds: i64,
    #[serde(default)]
    pub market_holidays: Vec<String>,
}

fn default_base_currency() -> String {
    "USD".into()
}
fn default_convert_mode() -> FxConvertMode {
    FxConvertMode::JustInTime
}
fn default_min_fx_order_usd() -> f64 {
    1_000.0
}
fn default_fx_buffer_bps() -> f64 {
    20.0
}
fn default_fx_order_type() -> EquityOrderTypeCfg {
    EquityOrderTypeCfg::Market
}
fn default_limit_slippage_bps() -> f64 {
    10.0
}
fn default_route() -> String {
    "IDEALPRO".into()
}
fn default_wait_for_fill_seconds() -> u64 {
    30
}
fn default_stale_quote_seconds() -> i64 {
    60
}

impl FxTomlConfig {
    pub fn to_fx_config(&self) -> Result<FxConfig> {
        let mut market_holidays = Vec::with_capacity(self.market_holidays.len());
        for raw in &self.market_holidays {
            let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
                Error::Config(format!("invalid market_holidays entry '{raw}': {e}"))
            })?;
            market_holidays.push(date);
        }
        Ok(FxConfig {
            enabled: self.enabled,
            base_currency: self.base_currency.clone(),
            funding_currencies: self.funding_currencies.clone(),
            use_mid_for_planning: self.use_mid_for_planning,
            min_fx_order_usd: self.min_fx_order_usd,
            max_fx_order_usd: self.max_fx_order_usd,
            fx_buffer_bps: self.fx_buffer_bps,
            order_type: match self.order_type {
                EquityOrderTypeCfg::Market => FxOrderType::Market,
                EquityOrderTypeCfg::Limit => FxOrderType::Limit,
            },
            limit_slippage_bps: self.limit_slippage_bps,
            route: self.route.clone(),
            wait_for_fill_seconds: self.wait_for_fill_seconds,
            prefer_market_hours: self.prefer_market_hours,
            stale_quote_seconds: self.stale_quote_seconds,
            market_holidays,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Last,
    Midpoint,
    Bidask,
}

/// Pricing source configuration (design notes §6 `pricing`).
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_price_source")]
    pub price_source: PriceSource,
    #[serde(default = "default_true")]
    pub fallback_to_snapshot: bool,
}

fn default_price_source() -> PriceSource {
    PriceSource::Midpoint
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleCfg {
    SpreadAware,
    StaticBps,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalateActionCfg {
    Cross,
    Market,
    Keep,
}

/// Spread-aware limit pricer configuration (design notes §6 `limits`).
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsTomlConfig {
    #[serde(default = "default_true")]
    pub smart_limit: bool,
    #[serde(default = "default_style")]
    pub style: StyleCfg,
    #[serde(default = "default_offset_frac")]
    pub buy_offset_frac: f64,
    #[serde(default = "default_offset_frac")]
    pub sell_offset_frac: f64,
    #[serde(default = "default_max_offset_bps")]
    pub max_offset_bps: f64,
    #[serde(default = "default_wide_spread_bps")]
    pub wide_spread_bps: f64,
    #[serde(default = "default_escalate_action")]
    pub escalate_action: EscalateActionCfg,
    #[serde(default = "default_stale_quote_seconds")]
    pub stale_quote_seconds: i64,
    #[serde(default = "default_true")]
    pub use_ask_bid_cap: bool,
}

fn default_style() -> StyleCfg {
    StyleCfg::SpreadAware
}
fn default_offset_frac() -> f64 {
    0.5
}
fn default_max_offset_bps() -> f64 {
    100.0
}
fn default_wide_spread_bps() -> f64 {
    50.0
}
fn default_escalate_action() -> EscalateActionCfg {
    EscalateActionCfg::Keep
}

impl LimitsTomlConfig {
    pub fn to_limits_config(&self) -> LimitsConfig {
        LimitsConfig {
            smart_limit: self.smart_limit,
            style: match self.style {
                StyleCfg::SpreadAware => PricerStyle::SpreadAware,
                StyleCfg::StaticBps => PricerStyle::StaticBps,
                StyleCfg::Off => PricerStyle::Off,
            },
            buy_offset_frac: self.buy_offset_frac,
            sell_offset_frac: self.sell_offset_frac,
            max_offset_bps: self.max_offset_bps,
            wide_spread_bps: self.wide_spread_bps,
            stale_quote_seconds: self.stale_quote_seconds,
            escalate_action: match self.escalate_action {
                EscalateActionCfg::Cross => EscalateAction::Cross,
                EscalateActionCfg::Market => EscalateAction::Market,
                EscalateActionCfg::Keep => EscalateAction::Keep,
            },
            use_ask_bid_cap: self.use_ask_bid_cap,
        }
    }
}

/// Pre-execution safety gate configuration (design notes §6 `safety`).
#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub paper_only: bool,
    #[serde(default = "default_true")]
    pub require_confirm: bool,
    #[serde(default)]
    pub kill_switch_file: Option<String>,
    /// Explicit operator opt-in required before `paper_only = false` is
    /// honored; `run --live` sets this, nothing else does.
    #[serde(default)]
    pub live_authorized: bool,
}

impl SafetyConfig {
    pub fn kill_switch_path(&self) -> Option<std::path::PathBuf> {
        self.kill_switch_file.as_ref().map(std::path::PathBuf::from)
    }

    /// Build the executor's gate. `confirmed` is the outcome of the
    /// interactive prompt (or its `--yes` bypass), decided by the caller.
    pub fn to_safety_gate(
        &self,
        prefer_rth: bool,
        confirmed: bool,
    ) -> crate::executor::SafetyGate {
        crate::executor::SafetyGate {
            kill_switch_file: self.kill_switch_path(),
            paper_only: self.paper_only,
            live_authorized: self.live_authorized,
            prefer_rth,
            confirmed,
        }
    }
}

/// Per-symbol drift band override (unused unless a future config surface
/// needs it); kept as a conversion helper alongside the scalar bps config.
pub fn per_symbol_bands(raw: &BTreeMap<String, f64>) -> Bands {
    let map = raw
        .iter()
        .filter_map(|(k, v)| rebalancer_core::Symbol::try_new(k).map(|s| (s, *v)))
        .collect();
    Bands::PerSymbol(map)
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.connection.port == 0 {
            return Err(Error::Config("port must be > 0".into()));
        }
        if self.account.id.is_empty() {
            return Err(Error::Config("account id must not be empty".into()));
        }
        if self.risk.max_position_pct <= 0.0 || self.risk.max_position_pct > 1.0 {
            return Err(Error::Config(
                "max_position_pct must be in (0.0, 1.0]".into(),
            ));
        }
        if self.risk.max_leverage < 1.0 {
            return Err(Error::Config("max_leverage must be >= 1.0".into()));
        }
        if self.risk.min_trade_usd < 0.0 {
            return Err(Error::Config("min_trade_usd must be >= 0".into()));
        }
        if self.risk.max_trade_usd <= 0.0 {
            return Err(Error::Config("max_trade_usd must be > 0".into()));
        }
        if self.risk.max_short_pct < 0.0 || self.risk.max_short_pct > 1.0 {
            return Err(Error::Config(
                "max_short_pct must be in [0.0, 1.0]".into(),
            ));
        }
        self.models.to_mix()?;
        if !(0.0..=100.0).contains(&self.rebalance.cash_buffer_pct) {
            return Err(Error::Config(
                "rebalance.cash_buffer_pct must be in [0, 100]".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.rebalance.maintenance_buffer_pct) {
            return Err(Error::Config(
                "rebalance.maintenance_buffer_pct must be in [0, 100]".into(),
            ));
        }
        if self.rebalance.allow_margin && self.rebalance.max_leverage < 1.0 {
            return Err(Error::Config(
                "rebalance.max_leverage must be >= 1.0".into(),
            ));
        }
        if self.fx.enabled && self.fx.funding_currencies.is_empty() {
            return Err(Error::Config(
                "fx.funding_currencies must be non-empty when fx.enabled is true".into(),
            ));
        }
        self.fx.to_fx_config()?;
        Ok(())
    }

    /// IBKR connection address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.connection.host, self.connection.port)
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> std::path::PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}
