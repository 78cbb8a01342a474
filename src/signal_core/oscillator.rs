//! WaveTrend oscillator computation
//!
//! Pure function over an ordered candle window: typical price is smoothed
//! through a chain of exponential averages into two comparable lines
//! (`wt1`, `wt2`). Recomputed from scratch on every update by design —
//! O(window) per call, bounded by the session window cap. An incremental
//! EMA carry would seed differently and shift results subtly, so it is not
//! substituted here.

use crate::types::Candle;

const ESA_SPAN: usize = 10;
const DEV_SPAN: usize = 10;
const TCI_SPAN: usize = 21;
const WT2_WINDOW: usize = 4;

/// Substituted for a deviation denominator of exactly zero (flat windows).
const DEV_EPSILON: f64 = 1e-10;

/// Two oscillator lines aligned index-for-index with the input candles.
///
/// `wt2` is `NaN` for the first `WT2_WINDOW - 1` indices (rolling mean not
/// yet filled); NaN comparisons are false, so warm-up bars never register a
/// crossover. Both lines are mathematically unstable for roughly the first
/// 13 bars while the EMA chain settles.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorSeries {
    pub wt1: Vec<f64>,
    pub wt2: Vec<f64>,
}

impl OscillatorSeries {
    pub fn len(&self) -> usize {
        self.wt1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wt1.is_empty()
    }
}

/// Compute the WaveTrend oscillator over an ordered candle sequence.
pub fn compute(candles: &[Candle]) -> OscillatorSeries {
    let ap: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    let esa = ema(&ap, ESA_SPAN);

    let abs_dev: Vec<f64> = ap
        .iter()
        .zip(&esa)
        .map(|(a, e)| (a - e).abs())
        .collect();
    let d = ema(&abs_dev, DEV_SPAN);

    let ci: Vec<f64> = ap
        .iter()
        .zip(&esa)
        .zip(&d)
        .map(|((a, e), dv)| {
            let denom = 0.015 * dv;
            let denom = if denom == 0.0 { DEV_EPSILON } else { denom };
            (a - e) / denom
        })
        .collect();

    let wt1 = ema(&ci, TCI_SPAN);
    let wt2 = rolling_mean(&wt1, WT2_WINDOW);

    OscillatorSeries { wt1, wt2 }
}

/// Recursive (non-adjusted) EMA seeded from the first value:
/// `ema[0] = x[0]`, `ema[i] = a*x[i] + (1-a)*ema[i-1]`, `a = 2/(span+1)`.
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = first;
    out.push(prev);

    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }

    out
}

/// Simple rolling mean; `NaN` until the window is filled.
fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        if i + 1 >= window {
            out.push(sum / window as f64);
        } else {
            out.push(f64::NAN);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100,
        }
    }

    fn sample_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                candle(i as i64 * 60, base, base + 1.0, base - 1.0, base + 0.3)
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let series = compute(&[]);
        assert!(series.is_empty());
        assert!(series.wt2.is_empty());
    }

    #[test]
    fn test_series_aligned_with_candles() {
        let candles = sample_candles(50);
        let series = compute(&candles);
        assert_eq!(series.len(), 50);
        assert_eq!(series.wt2.len(), 50);
    }

    #[test]
    fn test_wt2_nan_during_warmup() {
        let candles = sample_candles(20);
        let series = compute(&candles);

        for i in 0..3 {
            assert!(series.wt2[i].is_nan(), "wt2[{}] should be NaN", i);
        }
        for i in 3..20 {
            assert!(series.wt2[i].is_finite(), "wt2[{}] should be finite", i);
        }
    }

    #[test]
    fn test_idempotent_recompute() {
        let candles = sample_candles(120);
        let first = compute(&candles);
        let second = compute(&candles);
        assert_eq!(first.wt1, second.wt1);
        // NaN != NaN, so compare the filled region and NaN-ness separately
        assert_eq!(first.wt2[3..], second.wt2[3..]);
        assert!(first.wt2[..3].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_flat_window_stays_finite() {
        // All candles identical: deviation is exactly zero, epsilon kicks in
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(i * 60, 100.0, 100.0, 100.0, 100.0))
            .collect();
        let series = compute(&candles);

        assert!(series.wt1.iter().all(|v| v.is_finite()));
        assert!(series.wt1.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_ema_seeds_from_first_value() {
        let values = [10.0, 12.0, 11.0];
        let out = ema(&values, 10);
        assert_eq!(out[0], 10.0);
        let alpha = 2.0 / 11.0;
        assert!((out[1] - (alpha * 12.0 + (1.0 - alpha) * 10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_mean_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = rolling_mean(&values, 4);
        assert!(out[0].is_nan());
        assert!(out[2].is_nan());
        assert_eq!(out[3], 2.5);
        assert_eq!(out[4], 3.5);
    }
}
