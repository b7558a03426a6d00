use crate::domain::entities::order_book::OrderBookSnapshot;
use crate::domain::errors::ValidationError;
use crate::domain::value_objects::price::Price;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, ValidationError> {
        if !volume.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if volume < 0.0 {
            return Err(ValidationError::MustBeNonNegative);
        }
        Ok(Candle {
            timestamp: Utc::now(),
            open: Price::new(open)?,
            high: Price::new(high)?,
            low: Price::new(low)?,
            close: Price::new(close)?,
            volume,
        })
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close.value()).collect()
}

pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}

/// A technical indicator reduced to its latest value.
///
/// Every implementation returns a neutral default instead of failing when
/// the history is too short.
pub trait Indicator {
    type Output;

    fn calculate(&self, candles: &[Candle]) -> Self::Output;
}

pub struct EMA {
    pub period: usize,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        EMA { period }
    }

    /// Seeded with the simple average of the first `period` values. Shorter
    /// series collapse to their plain mean.
    pub fn calculate_on_values(&self, values: &[f64]) -> f64 {
        if values.is_empty() || self.period == 0 {
            return 0.0;
        }
        if values.len() < self.period {
            return values.iter().sum::<f64>() / values.len() as f64;
        }

        let multiplier = 2.0 / (self.period as f64 + 1.0);
        let mut ema = values[..self.period].iter().sum::<f64>() / self.period as f64;
        for &val in values.iter().skip(self.period) {
            ema = (val - ema) * multiplier + ema;
        }
        ema
    }
}

impl Indicator for EMA {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> f64 {
        self.calculate_on_values(&closes(candles))
    }
}

pub struct RSI {
    pub period: usize,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        RSI { period }
    }

    pub fn calculate_on_values(&self, closes: &[f64]) -> f64 {
        if self.period == 0 || closes.len() < self.period + 1 {
            return 50.0;
        }

        let window = &closes[closes.len() - self.period - 1..];
        let (mut gains, mut losses) = (0.0, 0.0);
        for pair in window.windows(2) {
            let change = pair[1] - pair[0];
            if change > 0.0 {
                gains += change;
            } else {
                losses += change.abs();
            }
        }

        let avg_gain = gains / self.period as f64;
        let avg_loss = losses / self.period as f64;
        if avg_loss == 0.0 {
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }
}

impl Indicator for RSI {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> f64 {
        self.calculate_on_values(&closes(candles))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdValues {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub struct MACD {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl Default for MACD {
    fn default() -> Self {
        MACD::new(12, 26, 9)
    }
}

impl MACD {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        MACD {
            fast_period,
            slow_period,
            signal_period,
        }
    }

    /// The signal line is the EMA of the last `signal_period` closes rather
    /// than an EMA of the MACD series itself.
    pub fn calculate_on_values(&self, closes: &[f64]) -> MacdValues {
        if closes.len() < self.slow_period {
            return MacdValues::default();
        }

        let line = EMA::new(self.fast_period).calculate_on_values(closes)
            - EMA::new(self.slow_period).calculate_on_values(closes);
        let tail_start = closes.len().saturating_sub(self.signal_period);
        let signal = EMA::new(self.signal_period).calculate_on_values(&closes[tail_start..]);

        MacdValues {
            line,
            signal,
            histogram: line - signal,
        }
    }
}

impl Indicator for MACD {
    type Output = MacdValues;

    fn calculate(&self, candles: &[Candle]) -> MacdValues {
        self.calculate_on_values(&closes(candles))
    }
}

/// Average true range over the trailing `period` candles
pub struct ATR {
    pub period: usize,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        ATR { period }
    }
}

impl Indicator for ATR {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> f64 {
        if self.period == 0 || candles.len() < self.period + 1 {
            return 0.0;
        }

        let window = &candles[candles.len() - self.period - 1..];
        let total: f64 = window
            .windows(2)
            .map(|pair| {
                let prev_close = pair[0].close.value();
                let high = pair[1].high.value();
                let low = pair[1].low.value();
                (high - low)
                    .max((high - prev_close).abs())
                    .max((low - prev_close).abs())
            })
            .sum();
        total / self.period as f64
    }
}

pub struct Momentum {
    pub period: usize,
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        Momentum { period }
    }

    /// Percent change from the close `period` bars back to the latest close
    pub fn calculate_on_values(&self, closes: &[f64]) -> f64 {
        let n = closes.len();
        if self.period == 0 || n < self.period + 1 {
            return 0.0;
        }
        let base = closes[n - 1 - self.period];
        if base == 0.0 {
            return 0.0;
        }
        (closes[n - 1] - base) / base * 100.0
    }
}

impl Indicator for Momentum {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> f64 {
        self.calculate_on_values(&closes(candles))
    }
}

pub struct VolumeRatio {
    pub period: usize,
}

impl VolumeRatio {
    pub fn new(period: usize) -> Self {
        VolumeRatio { period }
    }

    /// Latest volume over the mean of the `period` volumes before it
    pub fn calculate_on_values(&self, volumes: &[f64]) -> f64 {
        let n = volumes.len();
        if self.period == 0 || n < self.period + 1 {
            return 1.0;
        }
        let mean = volumes[n - 1 - self.period..n - 1].iter().sum::<f64>() / self.period as f64;
        if mean == 0.0 {
            return 1.0;
        }
        volumes[n - 1] / mean
    }
}

impl Indicator for VolumeRatio {
    type Output = f64;

    fn calculate(&self, candles: &[Candle]) -> f64 {
        self.calculate_on_values(&volumes(candles))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BollingerValues {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerValues {
    /// Where `price` sits inside the bands: 0 at the lower band, 1 at the
    /// upper one. 0.5 when the bands have no width.
    pub fn position(&self, price: f64) -> f64 {
        let width = self.upper - self.lower;
        if width <= f64::EPSILON {
            return 0.5;
        }
        (price - self.lower) / width
    }
}

pub struct BollingerBands {
    pub period: usize,
    pub std_dev: f64,
}

impl Default for BollingerBands {
    fn default() -> Self {
        BollingerBands::new(20, 2.0)
    }
}

impl BollingerBands {
    pub fn new(period: usize, std_dev: f64) -> Self {
        BollingerBands { period, std_dev }
    }

    /// Bands over the last `period` closes, population standard deviation.
    /// Collapses to the last close when the history is too short.
    pub fn calculate_on_values(&self, closes: &[f64]) -> BollingerValues {
        let last = closes.last().copied().unwrap_or(0.0);
        if self.period == 0 || closes.len() < self.period {
            return BollingerValues {
                upper: last,
                middle: last,
                lower: last,
            };
        }

        let window = &closes[closes.len() - self.period..];
        let sma = window.iter().sum::<f64>() / self.period as f64;
        let variance =
            window.iter().map(|c| (c - sma).powi(2)).sum::<f64>() / self.period as f64;
        let std = variance.sqrt();

        BollingerValues {
            upper: sma + self.std_dev * std,
            middle: sma,
            lower: sma - self.std_dev * std,
        }
    }
}

impl Indicator for BollingerBands {
    type Output = BollingerValues;

    fn calculate(&self, candles: &[Candle]) -> BollingerValues {
        self.calculate_on_values(&closes(candles))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StochasticValues {
    pub k: f64,
    /// Simple average of the last `d_period` %K values
    pub d: f64,
}

impl Default for StochasticValues {
    fn default() -> Self {
        StochasticValues { k: 50.0, d: 50.0 }
    }
}

pub struct StochasticOscillator {
    pub k_period: usize,
    pub d_period: usize,
}

impl Default for StochasticOscillator {
    fn default() -> Self {
        StochasticOscillator::new(14, 3)
    }
}

impl StochasticOscillator {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        StochasticOscillator { k_period, d_period }
    }

    fn percent_k(window: &[Candle]) -> f64 {
        let highest = window
            .iter()
            .map(|c| c.high.value())
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = window
            .iter()
            .map(|c| c.low.value())
            .fold(f64::INFINITY, f64::min);
        let range = highest - lowest;
        if range <= f64::EPSILON {
            return 50.0;
        }
        let close = window[window.len() - 1].close.value();
        (100.0 * (close - lowest) / range).clamp(0.0, 100.0)
    }
}

impl Indicator for StochasticOscillator {
    type Output = StochasticValues;

    fn calculate(&self, candles: &[Candle]) -> StochasticValues {
        if self.k_period == 0 || candles.len() < self.k_period {
            return StochasticValues::default();
        }

        let k_values: Vec<f64> = candles
            .windows(self.k_period)
            .map(Self::percent_k)
            .collect();
        let k = k_values[k_values.len() - 1];
        let tail = &k_values[k_values.len().saturating_sub(self.d_period.max(1))..];
        let d = tail.iter().sum::<f64>() / tail.len() as f64;

        StochasticValues { k, d }
    }
}

/// Bid/ask quantity imbalance in [-1, 1]; positive means more bids
pub fn order_book_imbalance(book: &OrderBookSnapshot) -> f64 {
    let bids = book.total_bid_quantity();
    let asks = book.total_ask_quantity();
    let total = bids + asks;
    if total <= 0.0 {
        return 0.0;
    }
    ((bids - asks) / total).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
    Unclear,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Uptrend => write!(f, "UPTREND"),
            Trend::Downtrend => write!(f, "DOWNTREND"),
            Trend::Sideways => write!(f, "SIDEWAYS"),
            Trend::Unclear => write!(f, "UNCLEAR"),
        }
    }
}

pub const TREND_MIN_CLOSES: usize = 50;

/// Classify the trend from price position against the 20/50 EMAs
pub fn detect_trend(closes: &[f64]) -> Trend {
    if closes.len() < TREND_MIN_CLOSES {
        return Trend::Unclear;
    }
    let price = closes[closes.len() - 1];
    let ema20 = EMA::new(20).calculate_on_values(closes);
    let ema50 = EMA::new(50).calculate_on_values(closes);

    if price > ema20 * 1.002 && ema20 > ema50 * 1.001 {
        Trend::Uptrend
    } else if price < ema20 * 0.998 && ema20 < ema50 * 0.999 {
        Trend::Downtrend
    } else {
        Trend::Sideways
    }
}

/// Snapshot of every indicator for one symbol at scan time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub price: f64,
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub momentum_pct: f64,
    pub volume_ratio: f64,
    pub atr: f64,
    pub order_book_imbalance: f64,
    pub spread_pct: f64,
    pub trend: Trend,
    pub bollinger: BollingerValues,
    pub stochastic: StochasticValues,
}

impl Indicators {
    /// ATR as a percentage of the last price, 0 when unknown
    pub fn atr_pct(&self) -> f64 {
        if self.price > 0.0 {
            self.atr / self.price * 100.0
        } else {
            0.0
        }
    }

    pub fn bollinger_position(&self) -> f64 {
        self.bollinger.position(self.price)
    }
}

impl Default for Indicators {
    fn default() -> Self {
        Indicators {
            price: 0.0,
            rsi: 50.0,
            macd_line: 0.0,
            macd_signal: 0.0,
            macd_histogram: 0.0,
            momentum_pct: 0.0,
            volume_ratio: 1.0,
            atr: 0.0,
            order_book_imbalance: 0.0,
            spread_pct: 0.0,
            trend: Trend::Unclear,
            bollinger: BollingerValues::default(),
            stochastic: StochasticValues::default(),
        }
    }
}

/// Computes the full indicator bundle from raw market data
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub momentum_period: usize,
    pub volume_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std_dev: f64,
    pub stochastic_k_period: usize,
    pub stochastic_d_period: usize,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        IndicatorEngine {
            rsi_period: 14,
            atr_period: 14,
            momentum_period: 10,
            volume_period: 20,
            bollinger_period: 20,
            bollinger_std_dev: 2.0,
            stochastic_k_period: 14,
            stochastic_d_period: 3,
        }
    }
}

impl IndicatorEngine {
    pub fn analyze(&self, candles: &[Candle], book: Option<&OrderBookSnapshot>) -> Indicators {
        let closes = closes(candles);
        let macd = MACD::default().calculate_on_values(&closes);

        Indicators {
            price: closes.last().copied().unwrap_or(0.0),
            rsi: RSI::new(self.rsi_period).calculate_on_values(&closes),
            macd_line: macd.line,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            momentum_pct: Momentum::new(self.momentum_period).calculate_on_values(&closes),
            volume_ratio: VolumeRatio::new(self.volume_period).calculate(candles),
            atr: ATR::new(self.atr_period).calculate(candles),
            order_book_imbalance: book.map(order_book_imbalance).unwrap_or(0.0),
            spread_pct: book.map(|b| b.spread_pct()).unwrap_or(0.0),
            trend: detect_trend(&closes),
            bollinger: BollingerBands::new(self.bollinger_period, self.bollinger_std_dev)
                .calculate_on_values(&closes),
            stochastic: StochasticOscillator::new(self.stochastic_k_period, self.stochastic_d_period)
                .calculate(candles),
        }
    }

    pub fn trend_of(&self, candles: &[Candle]) -> Trend {
        detect_trend(&closes(candles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order_book::OrderBookLevel;
    use proptest::prelude::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .map(|&c| Candle::new(c, c + 1.0, c - 1.0, c, 1000.0).unwrap())
            .collect()
    }

    #[test]
    fn test_candle_rejects_negative_volume() {
        assert_eq!(
            Candle::new(1.0, 1.0, 1.0, 1.0, -1.0).unwrap_err(),
            ValidationError::MustBeNonNegative
        );
    }

    #[test]
    fn test_ema_seed_and_recurrence() {
        let ema = EMA::new(3);
        // seed (1+2+3)/3 = 2, then (4-2)*0.5+2 = 3
        assert!((ema.calculate_on_values(&[1.0, 2.0, 3.0, 4.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_short_and_empty_series() {
        let ema = EMA::new(10);
        assert_eq!(ema.calculate_on_values(&[]), 0.0);
        assert!((ema.calculate_on_values(&[2.0, 4.0]) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_neutral_on_short_input() {
        assert_eq!(RSI::new(14).calculate_on_values(&[1.0; 14]), 50.0);
    }

    #[test]
    fn test_rsi_is_100_without_losses() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(RSI::new(14).calculate_on_values(&closes), 100.0);
    }

    #[test]
    fn test_rsi_flat_series_is_100() {
        assert_eq!(RSI::new(14).calculate_on_values(&[100.0; 15]), 100.0);
    }

    #[test]
    fn test_rsi_balanced_moves() {
        let rsi = RSI::new(2).calculate_on_values(&[100.0, 101.0, 100.0]);
        assert!((rsi - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_zero_on_short_input() {
        let closes = vec![100.0; 25];
        assert_eq!(MACD::default().calculate_on_values(&closes), MacdValues::default());
    }

    #[test]
    fn test_macd_signal_uses_last_closes() {
        let mut closes = vec![100.0; 26];
        closes.extend_from_slice(&[110.0; 9]);
        let macd = MACD::default().calculate_on_values(&closes);
        assert!((macd.signal - 110.0).abs() < 1e-9);
        assert!(macd.line > 0.0);
        assert!((macd.histogram - (macd.line - macd.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_atr_zero_on_short_input() {
        let candles = candles_from_closes(&[100.0; 14]);
        assert_eq!(ATR::new(14).calculate(&candles), 0.0);
    }

    #[test]
    fn test_atr_uses_previous_close_gap() {
        let candles = vec![
            Candle::new(100.0, 101.0, 99.0, 100.0, 1.0).unwrap(),
            Candle::new(105.0, 106.0, 104.0, 105.0, 1.0).unwrap(),
        ];
        // max(2, |106-100|, |104-100|) = 6
        assert!((ATR::new(1).calculate(&candles) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_scenario() {
        let closes = [100.0, 102.0, 101.0, 105.0, 107.0, 104.0, 110.0, 112.0, 108.0, 115.0];
        let momentum = Momentum::new(5).calculate_on_values(&closes);
        assert!((momentum - 7.476_635_514).abs() < 1e-6);
    }

    #[test]
    fn test_momentum_defaults() {
        assert_eq!(Momentum::new(5).calculate_on_values(&[1.0, 2.0]), 0.0);
        assert_eq!(
            Momentum::new(1).calculate_on_values(&[0.0, 5.0]),
            0.0
        );
    }

    #[test]
    fn test_volume_ratio_excludes_latest() {
        let volumes = [100.0, 100.0, 300.0];
        assert!((VolumeRatio::new(2).calculate_on_values(&volumes) - 3.0).abs() < 1e-12);
        assert_eq!(VolumeRatio::new(5).calculate_on_values(&volumes), 1.0);
        assert_eq!(VolumeRatio::new(2).calculate_on_values(&[0.0, 0.0, 5.0]), 1.0);
    }

    #[test]
    fn test_order_book_imbalance() {
        let book = OrderBookSnapshot::new(
            "BTC",
            vec![OrderBookLevel::new(99.0, 3.0)],
            vec![OrderBookLevel::new(101.0, 1.0)],
        );
        assert!((order_book_imbalance(&book) - 0.5).abs() < 1e-12);
        assert_eq!(order_book_imbalance(&OrderBookSnapshot::empty("BTC")), 0.0);

        let balanced = OrderBookSnapshot::new(
            "BTC",
            vec![OrderBookLevel::new(99.0, 2.0)],
            vec![OrderBookLevel::new(101.0, 2.0)],
        );
        assert_eq!(order_book_imbalance(&balanced), 0.0);
    }

    #[test]
    fn test_trend_unclear_below_fifty_closes() {
        assert_eq!(detect_trend(&[100.0; 49]), Trend::Unclear);
    }

    #[test]
    fn test_trend_classification() {
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        assert_eq!(detect_trend(&rising), Trend::Uptrend);
        assert_eq!(detect_trend(&falling), Trend::Downtrend);
        assert_eq!(detect_trend(&[100.0; 60]), Trend::Sideways);
    }

    #[test]
    fn test_engine_neutral_on_short_history() {
        let candles = candles_from_closes(&[100.0, 101.0]);
        let indicators = IndicatorEngine::default().analyze(&candles, None);
        assert_eq!(indicators.rsi, 50.0);
        assert_eq!(indicators.macd_line, 0.0);
        assert_eq!(indicators.trend, Trend::Unclear);
        assert_eq!(indicators.volume_ratio, 1.0);
        assert_eq!(indicators.price, 101.0);
    }

    #[test]
    fn test_engine_with_book() {
        let candles = candles_from_closes(&[100.0; 30]);
        let book = OrderBookSnapshot::new(
            "BTC",
            vec![OrderBookLevel::new(99.0, 1.0)],
            vec![OrderBookLevel::new(101.0, 3.0)],
        );
        let indicators = IndicatorEngine::default().analyze(&candles, Some(&book));
        assert!((indicators.order_book_imbalance + 0.5).abs() < 1e-12);
        assert!(indicators.spread_pct > 0.0);
        assert!((indicators.atr_pct() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_bands_population_std() {
        // mean 5, population std 2
        let closes = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bands = BollingerBands::new(8, 2.0).calculate_on_values(&closes);
        assert!((bands.middle - 5.0).abs() < 1e-12);
        assert!((bands.upper - 9.0).abs() < 1e-12);
        assert!((bands.lower - 1.0).abs() < 1e-12);
        assert!((bands.position(9.0) - 1.0).abs() < 1e-12);
        assert!((bands.position(3.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_bollinger_short_history_is_neutral() {
        let bands = BollingerBands::default().calculate_on_values(&[100.0, 101.0]);
        assert_eq!(bands.upper, 101.0);
        assert_eq!(bands.lower, 101.0);
        assert_eq!(bands.position(101.0), 0.5);
    }

    #[test]
    fn test_stochastic_at_range_extremes() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        let stochastic = StochasticOscillator::default();

        // close 119 inside a 105..120 low/high range
        let up = stochastic.calculate(&candles_from_closes(&rising));
        assert!((up.k - 1400.0 / 15.0).abs() < 1e-9);
        assert!((up.d - 1400.0 / 15.0).abs() < 1e-9);

        let down = stochastic.calculate(&candles_from_closes(&falling));
        assert!((down.k - 100.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_stochastic_neutral_without_range() {
        let flat: Vec<Candle> = (0..20)
            .map(|_| Candle::new(100.0, 100.0, 100.0, 100.0, 1.0).unwrap())
            .collect();
        assert_eq!(StochasticOscillator::default().calculate(&flat).k, 50.0);
        assert_eq!(
            StochasticOscillator::default().calculate(&flat[..5]),
            StochasticValues::default()
        );
    }

    #[test]
    fn test_engine_fills_bands_and_stochastic() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let indicators = IndicatorEngine::default().analyze(&candles_from_closes(&closes), None);
        assert!(indicators.bollinger.upper > indicators.bollinger.middle);
        assert!(indicators.bollinger_position() > 0.7);
        assert!(indicators.stochastic.k > 80.0);
    }

    proptest! {
        #[test]
        fn prop_stochastic_bounded(closes in prop::collection::vec(1.0f64..1_000.0, 0..40)) {
            let values = StochasticOscillator::default().calculate(&candles_from_closes(&closes));
            prop_assert!((0.0..=100.0).contains(&values.k));
            prop_assert!((0.0..=100.0).contains(&values.d));
        }

        #[test]
        fn prop_rsi_bounded(closes in prop::collection::vec(1.0f64..10_000.0, 0..80)) {
            let rsi = RSI::new(14).calculate_on_values(&closes);
            prop_assert!((0.0..=100.0).contains(&rsi));
        }

        #[test]
        fn prop_imbalance_bounded(
            bids in prop::collection::vec(0.0f64..1_000.0, 0..10),
            asks in prop::collection::vec(0.0f64..1_000.0, 0..10),
        ) {
            let book = OrderBookSnapshot::new(
                "BTC",
                bids.iter().map(|&q| OrderBookLevel::new(99.0, q)).collect(),
                asks.iter().map(|&q| OrderBookLevel::new(101.0, q)).collect(),
            );
            let obi = order_book_imbalance(&book);
            prop_assert!((-1.0..=1.0).contains(&obi));
        }

        #[test]
        fn prop_atr_non_negative(closes in prop::collection::vec(1.0f64..1_000.0, 0..40)) {
            let candles = candles_from_closes(&closes);
            prop_assert!(ATR::new(14).calculate(&candles) >= 0.0);
        }
    }
}
