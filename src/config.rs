use crate::application::services::portfolio_scheduler::{DrawdownPolicy, SchedulerConfig};
use crate::domain::errors::ConfigError;
use crate::domain::services::debate::DebateConfig;
use crate::domain::services::position_manager::{ExitPolicy, PositionConfig, TrailingStop};
use crate::domain::services::signal_scorer::{ScoringProfile, ScoringWeights};
use crate::rate_limit::RateLimiterConfig;
use crate::retry::{Backoff, RetryPolicy};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Session-wide trading configuration. Immutable once the scheduler starts.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub candle_interval: String,
    /// Higher timeframe for the macro-trend filter; None disables it
    pub reference_interval: Option<String>,

    pub scoring_profile: ScoringProfile,
    /// Overrides the profile's minimum winning score when set
    pub min_signal_score: Option<f64>,

    pub max_leverage: u32,
    pub max_position_size_pct: f64,
    pub max_exposure_pct: f64,
    pub min_confidence: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,

    pub trailing_enabled: bool,
    pub trailing_activation_pct: f64,
    pub trailing_distance_pct: f64,
    pub max_hold_secs: u64,
    pub poll_interval_secs: u64,
    pub close_max_attempts: u32,
    pub close_backoff_initial_ms: u64,
    pub close_backoff_max_ms: u64,

    pub max_concurrent_positions: usize,
    pub scan_interval_secs: u64,
    pub max_drawdown_pct: f64,
    pub drawdown_policy: DrawdownPolicy,
    pub max_daily_trades: u32,
    pub max_consecutive_losses: Option<u32>,
    pub loss_streak_cooldown_secs: u64,

    pub rate_limit_per_minute: u32,
    pub paper_starting_balance: f64,
    pub paper_seed: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            symbols: vec![
                "cmt_btcusdt".to_string(),
                "cmt_ethusdt".to_string(),
                "cmt_solusdt".to_string(),
            ],
            candle_interval: "1m".to_string(),
            reference_interval: Some("15m".to_string()),

            scoring_profile: ScoringProfile::Aggressive,
            min_signal_score: None,

            max_leverage: 20,
            max_position_size_pct: 25.0,
            max_exposure_pct: 80.0,
            min_confidence: 0.55,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,

            trailing_enabled: true,
            trailing_activation_pct: 3.0,
            trailing_distance_pct: 1.5,
            max_hold_secs: 180,
            poll_interval_secs: 3,
            close_max_attempts: 3,
            close_backoff_initial_ms: 1_000,
            close_backoff_max_ms: 8_000,

            max_concurrent_positions: 3,
            scan_interval_secs: 10,
            max_drawdown_pct: 10.0,
            drawdown_policy: DrawdownPolicy::Halt,
            max_daily_trades: 50,
            max_consecutive_losses: None,
            loss_streak_cooldown_secs: 300,

            rate_limit_per_minute: 100,
            paper_starting_balance: 1_000.0,
            paper_seed: 42,
        }
    }
}

/// Parse `raw` and accept it only when `valid` holds, otherwise warn and
/// keep `current`.
fn parse_checked<T>(key: &str, raw: &str, current: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {} (out of range), using default: {}",
                key,
                value,
                current
            );
            current
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                key,
                raw,
                e,
                current
            );
            current
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    let raw = raw.trim();
    raw.eq_ignore_ascii_case("true") || raw == "1"
}

impl TradingConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> TradingConfig {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source, starting from the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TradingConfig {
        let mut config = TradingConfig::default();

        if let Some(symbols) = lookup("SYMBOLS") {
            let parsed: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if parsed.is_empty() {
                tracing::warn!("SYMBOLS is empty, using default: {:?}", config.symbols);
            } else {
                config.symbols = parsed;
            }
        }

        if let Some(interval) = lookup("CANDLE_INTERVAL") {
            if !interval.trim().is_empty() {
                config.candle_interval = interval.trim().to_string();
            }
        }

        if let Some(interval) = lookup("REFERENCE_INTERVAL") {
            let interval = interval.trim();
            config.reference_interval = if interval.is_empty() || interval.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(interval.to_string())
            };
        }

        if let Some(profile) = lookup("SCORING_PROFILE") {
            match profile.parse::<ScoringProfile>() {
                Ok(value) => config.scoring_profile = value,
                Err(e) => tracing::warn!("{}, using default: {:?}", e, config.scoring_profile),
            }
        }

        if let Some(raw) = lookup("MIN_SIGNAL_SCORE") {
            let current = config
                .min_signal_score
                .unwrap_or(config.scoring_profile.weights().min_signal_score);
            let value = parse_checked("MIN_SIGNAL_SCORE", &raw, current, |v| *v > 0.0);
            config.min_signal_score = Some(value);
        }

        if let Some(raw) = lookup("MAX_LEVERAGE") {
            config.max_leverage =
                parse_checked("MAX_LEVERAGE", &raw, config.max_leverage, |v| (1..=125).contains(v));
        }

        if let Some(raw) = lookup("MAX_POSITION_SIZE_PCT") {
            config.max_position_size_pct = parse_checked(
                "MAX_POSITION_SIZE_PCT",
                &raw,
                config.max_position_size_pct,
                |v| *v > 0.0 && *v <= 100.0,
            );
        }

        if let Some(raw) = lookup("MAX_EXPOSURE_PCT") {
            config.max_exposure_pct = parse_checked(
                "MAX_EXPOSURE_PCT",
                &raw,
                config.max_exposure_pct,
                |v| *v > 0.0 && *v <= 100.0,
            );
        }

        if let Some(raw) = lookup("MIN_CONFIDENCE") {
            config.min_confidence = parse_checked("MIN_CONFIDENCE", &raw, config.min_confidence, |v| {
                (0.0..=1.0).contains(v)
            });
        }

        if let Some(raw) = lookup("STOP_LOSS_PCT") {
            config.stop_loss_pct =
                parse_checked("STOP_LOSS_PCT", &raw, config.stop_loss_pct, |v| *v > 0.0 && *v < 100.0);
        }

        if let Some(raw) = lookup("TAKE_PROFIT_PCT") {
            config.take_profit_pct =
                parse_checked("TAKE_PROFIT_PCT", &raw, config.take_profit_pct, |v| *v > 0.0);
        }

        if let Some(raw) = lookup("TRAILING_STOP_ENABLED") {
            config.trailing_enabled = parse_flag(&raw);
        }

        if let Some(raw) = lookup("TRAILING_ACTIVATION_PCT") {
            config.trailing_activation_pct = parse_checked(
                "TRAILING_ACTIVATION_PCT",
                &raw,
                config.trailing_activation_pct,
                |v| *v > 0.0,
            );
        }

        if let Some(raw) = lookup("TRAILING_DISTANCE_PCT") {
            config.trailing_distance_pct = parse_checked(
                "TRAILING_DISTANCE_PCT",
                &raw,
                config.trailing_distance_pct,
                |v| *v > 0.0,
            );
        }

        if let Some(raw) = lookup("MAX_HOLD_SECS") {
            config.max_hold_secs =
                parse_checked("MAX_HOLD_SECS", &raw, config.max_hold_secs, |v| *v >= 1);
        }

        if let Some(raw) = lookup("POLL_INTERVAL_SECS") {
            config.poll_interval_secs =
                parse_checked("POLL_INTERVAL_SECS", &raw, config.poll_interval_secs, |v| {
                    (1..=60).contains(v)
                });
        }

        if let Some(raw) = lookup("CLOSE_MAX_ATTEMPTS") {
            config.close_max_attempts =
                parse_checked("CLOSE_MAX_ATTEMPTS", &raw, config.close_max_attempts, |v| {
                    (1..=10).contains(v)
                });
        }

        if let Some(raw) = lookup("CLOSE_BACKOFF_INITIAL_MS") {
            config.close_backoff_initial_ms = parse_checked(
                "CLOSE_BACKOFF_INITIAL_MS",
                &raw,
                config.close_backoff_initial_ms,
                |v| *v >= 10,
            );
        }

        if let Some(raw) = lookup("CLOSE_BACKOFF_MAX_MS") {
            config.close_backoff_max_ms = parse_checked(
                "CLOSE_BACKOFF_MAX_MS",
                &raw,
                config.close_backoff_max_ms,
                |v| *v >= 10,
            );
        }

        if let Some(raw) = lookup("MAX_CONCURRENT_POSITIONS") {
            config.max_concurrent_positions = parse_checked(
                "MAX_CONCURRENT_POSITIONS",
                &raw,
                config.max_concurrent_positions,
                |v| (1..=50).contains(v),
            );
        }

        if let Some(raw) = lookup("SCAN_INTERVAL_SECS") {
            config.scan_interval_secs =
                parse_checked("SCAN_INTERVAL_SECS", &raw, config.scan_interval_secs, |v| {
                    (1..=3600).contains(v)
                });
        }

        if let Some(raw) = lookup("MAX_DRAWDOWN_PCT") {
            config.max_drawdown_pct =
                parse_checked("MAX_DRAWDOWN_PCT", &raw, config.max_drawdown_pct, |v| {
                    *v > 0.0 && *v <= 100.0
                });
        }

        let cooldown_secs = lookup("DRAWDOWN_COOLDOWN_SECS")
            .map(|raw| parse_checked("DRAWDOWN_COOLDOWN_SECS", &raw, 3_600u64, |v| *v >= 1))
            .unwrap_or(3_600);
        if let Some(raw) = lookup("DRAWDOWN_POLICY") {
            match raw.trim().to_lowercase().as_str() {
                "halt" => config.drawdown_policy = DrawdownPolicy::Halt,
                "pause" | "pause_and_resume" => {
                    config.drawdown_policy = DrawdownPolicy::PauseAndResume {
                        cooldown: Duration::from_secs(cooldown_secs),
                    }
                }
                other => tracing::warn!(
                    "Invalid DRAWDOWN_POLICY value: {} (expected halt or pause), using default: {:?}",
                    other,
                    config.drawdown_policy
                ),
            }
        }

        if let Some(raw) = lookup("MAX_DAILY_TRADES") {
            config.max_daily_trades =
                parse_checked("MAX_DAILY_TRADES", &raw, config.max_daily_trades, |v| {
                    (1..=1_000).contains(v)
                });
        }

        if let Some(raw) = lookup("MAX_CONSECUTIVE_LOSSES") {
            // 0 disables the pause
            let value = parse_checked(
                "MAX_CONSECUTIVE_LOSSES",
                &raw,
                config.max_consecutive_losses.unwrap_or(0),
                |v| *v <= 100,
            );
            config.max_consecutive_losses = (value > 0).then_some(value);
        }

        if let Some(raw) = lookup("LOSS_STREAK_COOLDOWN_SECS") {
            config.loss_streak_cooldown_secs = parse_checked(
                "LOSS_STREAK_COOLDOWN_SECS",
                &raw,
                config.loss_streak_cooldown_secs,
                |v| *v >= 1,
            );
        }

        if let Some(raw) = lookup("RATE_LIMIT_PER_MINUTE") {
            config.rate_limit_per_minute =
                parse_checked("RATE_LIMIT_PER_MINUTE", &raw, config.rate_limit_per_minute, |v| {
                    *v >= 1
                });
        }

        if let Some(raw) = lookup("PAPER_STARTING_BALANCE") {
            config.paper_starting_balance = parse_checked(
                "PAPER_STARTING_BALANCE",
                &raw,
                config.paper_starting_balance,
                |v| *v > 0.0,
            );
        }

        if let Some(raw) = lookup("PAPER_SEED") {
            config.paper_seed = parse_checked("PAPER_SEED", &raw, config.paper_seed, |_| true);
        }

        config
    }

    /// Reject combinations that individually parse but cannot work together
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        if self.max_position_size_pct > self.max_exposure_pct {
            return Err(ConfigError::InvalidValue {
                field: "MAX_POSITION_SIZE_PCT",
                reason: format!(
                    "{} exceeds the exposure ceiling {}",
                    self.max_position_size_pct, self.max_exposure_pct
                ),
            });
        }
        if self.trailing_enabled && self.trailing_distance_pct >= self.trailing_activation_pct {
            return Err(ConfigError::InvalidValue {
                field: "TRAILING_DISTANCE_PCT",
                reason: "must be smaller than the activation threshold".to_string(),
            });
        }
        if self.close_backoff_initial_ms > self.close_backoff_max_ms {
            return Err(ConfigError::InvalidValue {
                field: "CLOSE_BACKOFF_INITIAL_MS",
                reason: "must not exceed CLOSE_BACKOFF_MAX_MS".to_string(),
            });
        }
        if self.max_leverage == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_LEVERAGE",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn scoring_weights(&self) -> ScoringWeights {
        let mut weights = self.scoring_profile.weights();
        if let Some(min_score) = self.min_signal_score {
            weights.min_signal_score = min_score;
        }
        weights
    }

    pub fn debate_config(&self) -> DebateConfig {
        DebateConfig {
            max_leverage: self.max_leverage,
            max_position_size_pct: self.max_position_size_pct,
            max_exposure_pct: self.max_exposure_pct,
            min_confidence: self.min_confidence,
            default_stop_loss_pct: self.stop_loss_pct,
            default_take_profit_pct: self.take_profit_pct,
            ..DebateConfig::default()
        }
    }

    pub fn exit_policy(&self) -> ExitPolicy {
        ExitPolicy {
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
            trailing: self.trailing_enabled.then_some(TrailingStop {
                activation_pct: self.trailing_activation_pct,
                distance_pct: self.trailing_distance_pct,
            }),
            max_hold: Duration::from_secs(self.max_hold_secs),
        }
    }

    pub fn position_config(&self) -> PositionConfig {
        PositionConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            close_retry: RetryPolicy {
                max_attempts: self.close_max_attempts,
                backoff: Backoff::Exponential {
                    initial: Duration::from_millis(self.close_backoff_initial_ms),
                    max: Duration::from_millis(self.close_backoff_max_ms),
                },
            },
            exit_policy: self.exit_policy(),
            ..PositionConfig::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            symbols: self.symbols.clone(),
            candle_interval: self.candle_interval.clone(),
            reference_interval: self.reference_interval.clone(),
            max_concurrent_positions: self.max_concurrent_positions,
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            max_drawdown_pct: self.max_drawdown_pct,
            drawdown_policy: self.drawdown_policy,
            max_daily_trades: self.max_daily_trades,
            max_consecutive_losses: self.max_consecutive_losses,
            loss_streak_cooldown: Duration::from_secs(self.loss_streak_cooldown_secs),
            ..SchedulerConfig::default()
        }
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: self.rate_limit_per_minute,
        }
    }
}
