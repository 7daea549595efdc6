//! Statistical analysis kernels
//!
//! Standard, replaceable implementations of the pattern / sentiment /
//! anomaly / prediction interfaces. A neural backend can be swapped in
//! behind the same signatures without touching callers.

use chrono::Utc;

use crate::analysis::types::{
    Anomaly, AnomalyKind, AnomalyReport, PatternMatch, PredictionResult, SentimentLabel,
    SentimentResult,
};
use crate::market::types::{HistoricalPoint, NormalizedQuote};

/// Statistical analyzer over normalized historical series
#[derive(Debug, Clone)]
pub struct Analyzer {
    /// Z-score magnitude above which a point is anomalous
    pub anomaly_threshold: f64,
    /// Short/long SMA windows for crossover patterns
    pub sma_short: usize,
    pub sma_long: usize,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self {
            anomaly_threshold: 2.5,
            sma_short: 7,
            sma_long: 21,
        }
    }
}

fn sma(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

impl Analyzer {
    pub fn new(anomaly_threshold: f64, sma_short: usize, sma_long: usize) -> Self {
        Self {
            anomaly_threshold,
            sma_short,
            sma_long,
        }
    }

    /// Detect chart patterns in a price series.
    /// Reported names are stable; alert matching is substring-based.
    pub fn detect_patterns(&self, history: &[HistoricalPoint]) -> Vec<PatternMatch> {
        let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
        let mut patterns = Vec::new();

        let short = sma(&prices, self.sma_short);
        let long = sma(&prices, self.sma_long);

        // Align the two series on their tails and look for a crossover
        if short.len() >= 2 && long.len() >= 2 {
            let s = &short[short.len() - 2..];
            let l = &long[long.len() - 2..];
            if s[0] <= l[0] && s[1] > l[1] {
                patterns.push(PatternMatch {
                    name: "golden cross".into(),
                    confidence: 0.7,
                    completed_at: prices.len() - 1,
                });
            } else if s[0] >= l[0] && s[1] < l[1] {
                patterns.push(PatternMatch {
                    name: "death cross".into(),
                    confidence: 0.7,
                    completed_at: prices.len() - 1,
                });
            }
        }

        // Structure: three consecutive rising swing highs / falling swing lows
        if prices.len() >= 6 {
            let tail = &prices[prices.len() - 6..];
            let rising = tail.windows(2).all(|w| w[1] >= w[0]);
            let falling = tail.windows(2).all(|w| w[1] <= w[0]);
            if rising {
                patterns.push(PatternMatch {
                    name: "higher highs".into(),
                    confidence: 0.6,
                    completed_at: prices.len() - 1,
                });
            }
            if falling {
                patterns.push(PatternMatch {
                    name: "lower lows".into(),
                    confidence: 0.6,
                    completed_at: prices.len() - 1,
                });
            }
        }

        // Double bottom: two local minima within 2% of each other
        if let Some(pattern) = self.detect_double_bottom(&prices) {
            patterns.push(pattern);
        }

        patterns
    }

    fn detect_double_bottom(&self, prices: &[f64]) -> Option<PatternMatch> {
        if prices.len() < 7 {
            return None;
        }
        let mut minima: Vec<(usize, f64)> = Vec::new();
        for i in 1..prices.len() - 1 {
            if prices[i] < prices[i - 1] && prices[i] < prices[i + 1] {
                minima.push((i, prices[i]));
            }
        }
        for pair in minima.windows(2) {
            let (i, a) = pair[0];
            let (j, b) = pair[1];
            if j - i >= 2 && a > 0.0 && ((a - b).abs() / a) < 0.02 {
                return Some(PatternMatch {
                    name: "double bottom".into(),
                    confidence: 0.55,
                    completed_at: j,
                });
            }
        }
        None
    }

    /// Composite sentiment from momentum, volume trend and the live quote
    pub fn sentiment(
        &self,
        symbol: &str,
        history: &[HistoricalPoint],
        quote: &NormalizedQuote,
    ) -> SentimentResult {
        let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
        let volumes: Vec<f64> = history.iter().map(|p| p.volume).collect();

        // Momentum: change over the analyzed window
        let momentum = match (prices.first(), prices.last()) {
            (Some(&first), Some(&last)) if first > 0.0 => ((last - first) / first).clamp(-1.0, 1.0),
            _ => 0.0,
        };

        // Volume trend: last third vs first third
        let volume_trend = if volumes.len() >= 6 {
            let third = volumes.len() / 3;
            let (early, _) = mean_and_std(&volumes[..third]);
            let (late, _) = mean_and_std(&volumes[volumes.len() - third..]);
            if early > 0.0 {
                ((late - early) / early).clamp(-1.0, 1.0)
            } else {
                0.0
            }
        } else {
            0.0
        };

        // Live 24h change, scaled into [-1, 1] at +/-20%
        let live = (quote.change_24h / 20.0).clamp(-1.0, 1.0);

        let score = (momentum * 0.5 + volume_trend * 0.2 + live * 0.3).clamp(-1.0, 1.0);

        let label = match score {
            s if s <= -0.5 => SentimentLabel::VeryBearish,
            s if s <= -0.15 => SentimentLabel::Bearish,
            s if s < 0.15 => SentimentLabel::Neutral,
            s if s < 0.5 => SentimentLabel::Bullish,
            _ => SentimentLabel::VeryBullish,
        };

        SentimentResult {
            symbol: symbol.to_string(),
            label,
            score,
            generated_at: Utc::now(),
        }
    }

    /// Z-score anomaly scan over returns and volume
    pub fn detect_anomalies(
        &self,
        symbol: &str,
        history: &[HistoricalPoint],
        quote: &NormalizedQuote,
    ) -> AnomalyReport {
        let mut anomalies = Vec::new();

        // Returns series
        let returns: Vec<f64> = history
            .windows(2)
            .filter(|w| w[0].price > 0.0)
            .map(|w| (w[1].price - w[0].price) / w[0].price)
            .collect();
        let (ret_mean, ret_std) = mean_and_std(&returns);

        if ret_std > 0.0 {
            for (i, r) in returns.iter().enumerate() {
                let z = (r - ret_mean) / ret_std;
                if z.abs() >= self.anomaly_threshold {
                    anomalies.push(Anomaly {
                        index: i + 1,
                        timestamp: history[i + 1].timestamp,
                        z_score: z,
                        kind: if z > 0.0 {
                            AnomalyKind::PriceSpike
                        } else {
                            AnomalyKind::PriceCrash
                        },
                    });
                }
            }
        }

        // Volume bursts
        let volumes: Vec<f64> = history.iter().map(|p| p.volume).collect();
        let (vol_mean, vol_std) = mean_and_std(&volumes);
        if vol_std > 0.0 {
            for (i, v) in volumes.iter().enumerate() {
                let z = (v - vol_mean) / vol_std;
                if z >= self.anomaly_threshold {
                    anomalies.push(Anomaly {
                        index: i,
                        timestamp: history[i].timestamp,
                        z_score: z,
                        kind: AnomalyKind::VolumeBurst,
                    });
                }
            }
        }

        // Live quote moving far outside the historical band counts too
        if let Some(last) = history.last() {
            if last.price > 0.0 && ret_std > 0.0 {
                let live_return = (quote.price - last.price) / last.price;
                let z = (live_return - ret_mean) / ret_std;
                if z.abs() >= self.anomaly_threshold {
                    anomalies.push(Anomaly {
                        index: history.len(),
                        timestamp: quote.last_updated,
                        z_score: z,
                        kind: if z > 0.0 {
                            AnomalyKind::PriceSpike
                        } else {
                            AnomalyKind::PriceCrash
                        },
                    });
                }
            }
        }

        AnomalyReport {
            symbol: symbol.to_string(),
            total_anomalies: anomalies.len(),
            anomalies,
            generated_at: Utc::now(),
        }
    }

    /// Drift-extrapolation price prediction.
    /// Confidence shrinks with realized volatility.
    pub fn predict(
        &self,
        symbol: &str,
        history: &[HistoricalPoint],
        horizon_days: u32,
    ) -> Option<PredictionResult> {
        if history.len() < 3 {
            return None;
        }
        let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
        let returns: Vec<f64> = prices
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        let (drift, volatility) = mean_and_std(&returns);

        let last = *prices.last()?;
        let predicted = last * (1.0 + drift).powi(horizon_days as i32);
        let confidence = (1.0 - volatility * 5.0).clamp(0.05, 0.95);

        Some(PredictionResult {
            symbol: symbol.to_string(),
            predicted_price: predicted,
            expected_change_pct: if last > 0.0 {
                (predicted - last) / last * 100.0
            } else {
                0.0
            },
            confidence,
            horizon_days,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn series(prices: &[f64]) -> Vec<HistoricalPoint> {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| HistoricalPoint {
                timestamp: start + Duration::days(i as i64),
                price,
                volume: 100.0,
            })
            .collect()
    }

    fn quote(price: f64, change_24h: f64) -> NormalizedQuote {
        NormalizedQuote {
            symbol: "TEST".into(),
            price,
            change_24h,
            change_7d: None,
            volume_24h: 100.0,
            market_cap: 1000.0,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_sma() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let result = sma(&values, 2);
        assert_eq!(result, vec![1.5, 2.5, 3.5]);
        assert!(sma(&values, 0).is_empty());
        assert!(sma(&values, 5).is_empty());
    }

    #[test]
    fn test_higher_highs_pattern() {
        let analyzer = Analyzer::default();
        let history = series(&[1.0, 1.1, 1.2, 1.3, 1.4, 1.5, 1.6, 1.7]);
        let patterns = analyzer.detect_patterns(&history);
        assert!(patterns.iter().any(|p| p.name == "higher highs"));
    }

    #[test]
    fn test_anomaly_detection_flags_spike() {
        let analyzer = Analyzer::default();
        // Flat series with one violent move
        let mut prices = vec![1.0; 30];
        prices[15] = 3.0;
        prices[16] = 1.0;
        let history = series(&prices);
        let report = analyzer.detect_anomalies("TEST", &history, &quote(1.0, 0.0));
        assert!(report.total_anomalies > 0);
        assert!(report
            .anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::PriceSpike));
    }

    #[test]
    fn test_no_anomalies_on_flat_series() {
        let analyzer = Analyzer::default();
        let history = series(&[1.0; 20]);
        let report = analyzer.detect_anomalies("TEST", &history, &quote(1.0, 0.0));
        assert_eq!(report.total_anomalies, 0);
    }

    #[test]
    fn test_sentiment_bullish_on_uptrend() {
        let analyzer = Analyzer::default();
        let history = series(&[1.0, 1.2, 1.4, 1.6, 1.8, 2.0, 2.2, 2.4]);
        let result = analyzer.sentiment("TEST", &history, &quote(2.4, 10.0));
        assert!(result.score > 0.15, "score was {}", result.score);
        assert!(matches!(
            result.label,
            SentimentLabel::Bullish | SentimentLabel::VeryBullish
        ));
    }

    #[test]
    fn test_sentiment_label_contains_for_alerts() {
        // Alert matching is case-insensitive substring on the label text
        assert!(SentimentLabel::VeryBullish
            .as_str()
            .to_lowercase()
            .contains("bullish"));
    }

    #[test]
    fn test_prediction_follows_drift() {
        let analyzer = Analyzer::default();
        let history = series(&[1.0, 1.1, 1.21, 1.331]);
        let prediction = analyzer.predict("TEST", &history, 1).unwrap();
        assert!(prediction.predicted_price > 1.331);
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 0.95);
    }

    #[test]
    fn test_prediction_needs_history() {
        let analyzer = Analyzer::default();
        assert!(analyzer.predict("TEST", &series(&[1.0]), 1).is_none());
    }
}
