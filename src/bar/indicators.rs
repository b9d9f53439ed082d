//! Technical indicator enrichment
//!
//! Pure functions over a chronologically ordered bar sequence. Warm-up
//! windows leave the indicator as `None` instead of failing.

use super::Bar;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const SMA_FAST: usize = 20;
const SMA_SLOW: usize = 50;
const EMA_FAST: u32 = 12;
const EMA_SLOW: u32 = 26;
const MACD_SIGNAL: u32 = 9;
const RSI_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_WIDTH: Decimal = dec!(2);

/// Decimal places kept on stored indicator values
const INDICATOR_SCALE: u32 = 8;

/// Indicator values attached to a bar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub sma_20: Option<Decimal>,
    pub sma_50: Option<Decimal>,
    pub ema_12: Option<Decimal>,
    pub ema_26: Option<Decimal>,
    pub rsi: Option<Decimal>,
    pub macd: Option<Decimal>,
    pub macd_signal: Option<Decimal>,
    pub macd_histogram: Option<Decimal>,
    pub bollinger_upper: Option<Decimal>,
    pub bollinger_middle: Option<Decimal>,
    pub bollinger_lower: Option<Decimal>,
}

impl Indicators {
    /// Column names in storage order
    pub const NAMES: [&'static str; 11] = [
        "sma_20",
        "sma_50",
        "ema_12",
        "ema_26",
        "rsi",
        "macd",
        "macd_signal",
        "macd_histogram",
        "bollinger_upper",
        "bollinger_middle",
        "bollinger_lower",
    ];

    /// Values in the same order as [`Indicators::NAMES`]
    pub fn values(&self) -> [Option<Decimal>; 11] {
        [
            self.sma_20,
            self.sma_50,
            self.ema_12,
            self.ema_26,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.macd_histogram,
            self.bollinger_upper,
            self.bollinger_middle,
            self.bollinger_lower,
        ]
    }

    /// Build from values ordered as [`Indicators::NAMES`]
    pub fn from_values(v: [Option<Decimal>; 11]) -> Self {
        Self {
            sma_20: v[0],
            sma_50: v[1],
            ema_12: v[2],
            ema_26: v[3],
            rsi: v[4],
            macd: v[5],
            macd_signal: v[6],
            macd_histogram: v[7],
            bollinger_upper: v[8],
            bollinger_middle: v[9],
            bollinger_lower: v[10],
        }
    }
}

/// Compute every indicator for `bars` in place
///
/// Bars must already be in chronological order.
pub fn enrich(bars: &mut [Bar]) {
    if bars.is_empty() {
        return;
    }

    let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();

    let sma_fast = rolling_mean(&closes, SMA_FAST);
    let sma_slow = rolling_mean(&closes, SMA_SLOW);
    let ema_fast = ewm_mean(&closes, EMA_FAST);
    let ema_slow = ewm_mean(&closes, EMA_SLOW);
    let macd: Vec<Decimal> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(fast, slow)| *fast - *slow)
        .collect();
    let macd_signal = ewm_mean(&macd, MACD_SIGNAL);
    let rsi = rsi(&closes, RSI_PERIOD);
    let std_dev = rolling_std(&closes, BOLLINGER_PERIOD);

    for (i, bar) in bars.iter_mut().enumerate() {
        let middle = sma_fast[i];
        let band = match (middle, std_dev[i]) {
            (Some(m), Some(sd)) => Some((m + sd * BOLLINGER_WIDTH, m - sd * BOLLINGER_WIDTH)),
            _ => None,
        };

        bar.indicators = Indicators {
            sma_20: sma_fast[i].map(round),
            sma_50: sma_slow[i].map(round),
            ema_12: Some(round(ema_fast[i])),
            ema_26: Some(round(ema_slow[i])),
            rsi: rsi[i].map(round),
            macd: Some(round(macd[i])),
            macd_signal: Some(round(macd_signal[i])),
            macd_histogram: Some(round(macd[i] - macd_signal[i])),
            bollinger_upper: band.map(|(upper, _)| round(upper)),
            bollinger_middle: middle.map(round),
            bollinger_lower: band.map(|(_, lower)| round(lower)),
        };
    }
}

fn round(value: Decimal) -> Decimal {
    value.round_dp(INDICATOR_SCALE)
}

/// Simple moving average, `None` until `window` values are available
fn rolling_mean(values: &[Decimal], window: usize) -> Vec<Option<Decimal>> {
    let divisor = Decimal::from(window);
    let mut sum = Decimal::ZERO;
    let mut out = Vec::with_capacity(values.len());

    for (i, value) in values.iter().enumerate() {
        sum += *value;
        if i >= window {
            sum -= values[i - window];
        }
        out.push((i + 1 >= window).then(|| sum / divisor));
    }

    out
}

/// Sample standard deviation over a rolling window
fn rolling_std(values: &[Decimal], window: usize) -> Vec<Option<Decimal>> {
    if window < 2 {
        return vec![None; values.len()];
    }

    let divisor = Decimal::from(window - 1);
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mean = slice.iter().copied().sum::<Decimal>() / Decimal::from(window);
            let variance = slice
                .iter()
                .map(|v| (*v - mean) * (*v - mean))
                .sum::<Decimal>()
                / divisor;
            variance.sqrt()
        })
        .collect()
}

/// Span-adjusted exponentially weighted mean
///
/// Every observation is weighted by `(1 - alpha)^age` and the weights are
/// renormalized, so the series is defined from the first value.
fn ewm_mean(values: &[Decimal], span: u32) -> Vec<Decimal> {
    let alpha = dec!(2) / Decimal::from(span + 1);
    let decay = Decimal::ONE - alpha;
    let mut numerator = Decimal::ZERO;
    let mut denominator = Decimal::ZERO;

    values
        .iter()
        .map(|value| {
            numerator = *value + decay * numerator;
            denominator = Decimal::ONE + decay * denominator;
            numerator / denominator
        })
        .collect()
}

/// Relative strength index from rolling mean gains and losses
fn rsi(closes: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; closes.len()];
    if closes.len() <= period {
        return out;
    }

    let deltas: Vec<Decimal> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let divisor = Decimal::from(period);

    // deltas[i - 1] is the move into bar i; bar 0 has no move.
    for i in period..closes.len() {
        let window = &deltas[i - period..i];
        let gain = window
            .iter()
            .filter(|d| **d > Decimal::ZERO)
            .copied()
            .sum::<Decimal>()
            / divisor;
        let loss = window
            .iter()
            .filter(|d| **d < Decimal::ZERO)
            .map(|d| -*d)
            .sum::<Decimal>()
            / divisor;

        out[i] = if loss.is_zero() {
            (!gain.is_zero()).then_some(dec!(100))
        } else {
            let rs = gain / loss;
            Some(dec!(100) - dec!(100) / (Decimal::ONE + rs))
        };
    }

    out
}
