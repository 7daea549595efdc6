//! Alert engine
//!
//! Holds the alert list and runs a ticker while it is non-empty. Each
//! tick evaluates pending alerts against market data and the analysis
//! services; a match fires the alert exactly once.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::types::{Alert, AlertCondition, AlertStats};
use crate::analysis::cache::{AnalysisCache, CacheKind};
use crate::analysis::types::{AnomalyReport, SentimentResult};
use crate::analysis::Analyzer;
use crate::config::AlertEngineConfig;
use crate::error::{Error, Result};
use crate::market::types::HistoricalInterval;
use crate::market::MarketData;

const PATTERN_HISTORY_DAYS: i64 = 60;
const SENTIMENT_HISTORY_DAYS: i64 = 30;

/// Notification delivered when an alert fires
#[derive(Debug, Clone)]
pub struct AlertNotification {
    pub alert_id: Uuid,
    pub symbol: String,
    pub message: String,
    pub data: serde_json::Value,
}

type TriggerCallback = Box<dyn Fn(&Alert, &serde_json::Value) + Send + Sync>;

/// Everything a tick needs, shared with the ticker task
struct AlertCore {
    config: AlertEngineConfig,
    market: Arc<dyn MarketData>,
    analyzer: Analyzer,
    cache: Arc<AnalysisCache>,
    alerts: RwLock<Vec<Alert>>,
    callbacks: RwLock<HashMap<Uuid, TriggerCallback>>,
    notify_tx: mpsc::Sender<AlertNotification>,
}

/// The periodic-check alert engine
pub struct AlertEngine {
    core: Arc<AlertCore>,
    notify_rx: std::sync::Mutex<Option<mpsc::Receiver<AlertNotification>>>,
    ticker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl AlertEngine {
    pub fn new(
        config: AlertEngineConfig,
        market: Arc<dyn MarketData>,
        analyzer: Analyzer,
        cache: Arc<AnalysisCache>,
    ) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(64);
        Self {
            core: Arc::new(AlertCore {
                config,
                market,
                analyzer,
                cache,
                alerts: RwLock::new(Vec::new()),
                callbacks: RwLock::new(HashMap::new()),
                notify_tx,
            }),
            notify_rx: std::sync::Mutex::new(Some(notify_rx)),
            ticker: Mutex::new(None),
        }
    }

    /// Take the notification receiver; callable once
    pub fn take_notification_receiver(&self) -> Option<mpsc::Receiver<AlertNotification>> {
        self.notify_rx.lock().expect("notify lock poisoned").take()
    }

    /// Add an alert; monitoring starts when the list becomes non-empty
    pub async fn add_alert(&self, alert: Alert, on_trigger: Option<TriggerCallback>) -> Uuid {
        let id = alert.id;
        let was_empty = {
            let mut alerts = self.core.alerts.write().await;
            let was_empty = alerts.is_empty();
            alerts.push(alert);
            was_empty
        };

        if let Some(callback) = on_trigger {
            self.core.callbacks.write().await.insert(id, callback);
        }

        if was_empty {
            self.start_ticker().await;
        }

        info!(alert = %id, "Alert added");
        id
    }

    /// Remove an alert; monitoring stops when the list empties
    pub async fn remove_alert(&self, id: Uuid) -> Result<Alert> {
        let (removed, now_empty) = {
            let mut alerts = self.core.alerts.write().await;
            let index = alerts
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| Error::AlertNotFound(id.to_string()))?;
            let removed = alerts.remove(index);
            (removed, alerts.is_empty())
        };

        self.core.callbacks.write().await.remove(&id);

        if now_empty {
            self.stop_ticker().await;
        }

        Ok(removed)
    }

    pub async fn get_alerts(&self) -> Vec<Alert> {
        self.core.alerts.read().await.clone()
    }

    pub async fn get_alert_stats(&self) -> AlertStats {
        let alerts = self.core.alerts.read().await;
        let mut stats = AlertStats {
            total: alerts.len(),
            ..Default::default()
        };
        for alert in alerts.iter() {
            if alert.triggered {
                stats.triggered += 1;
            } else {
                stats.pending += 1;
            }
            match alert.condition {
                AlertCondition::Price { .. } => stats.price += 1,
                AlertCondition::Pattern { .. } => stats.pattern += 1,
                AlertCondition::Sentiment { .. } => stats.sentiment += 1,
                AlertCondition::Anomaly => stats.anomaly += 1,
            }
        }
        stats
    }

    pub async fn clear_all(&self) {
        self.core.alerts.write().await.clear();
        self.core.callbacks.write().await.clear();
        self.stop_ticker().await;
        info!("All alerts cleared");
    }

    /// Evaluate every pending alert once
    pub async fn check_all(&self) {
        self.core.check_all().await;
    }

    async fn start_ticker(&self) {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let core = self.core.clone();
        let loop_cancel = cancel.clone();
        let interval = Duration::from_secs(self.core.config.check_interval_secs);

        let handle = tokio::spawn(async move {
            // First check lands one full period after arming
            let mut tick =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => {
                        info!("Alert ticker shutting down");
                        break;
                    }
                    _ = tick.tick() => {
                        core.check_all().await;
                    }
                }
            }
        });

        *ticker = Some((cancel, handle));
        info!("Alert monitoring started");
    }

    async fn stop_ticker(&self) {
        if let Some((cancel, handle)) = self.ticker.lock().await.take() {
            cancel.cancel();
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
            info!("Alert monitoring stopped");
        }
    }
}

impl AlertCore {
    async fn check_all(&self) {
        let pending: Vec<Alert> = {
            let alerts = self.alerts.read().await;
            alerts.iter().filter(|a| !a.triggered).cloned().collect()
        };

        for alert in pending {
            match self.evaluate(&alert).await {
                Ok(Some(data)) => self.fire(alert.id, data).await,
                Ok(None) => {
                    let mut alerts = self.alerts.write().await;
                    if let Some(entry) = alerts.iter_mut().find(|a| a.id == alert.id) {
                        entry.last_check = Some(Utc::now());
                    }
                }
                Err(e) => {
                    // Evaluation failures are transient; retry next tick
                    debug!(alert = %alert.id, error = %e, "Alert check failed");
                }
            }
        }
    }

    /// Evaluate one alert; Some(data) means it matched
    async fn evaluate(&self, alert: &Alert) -> Result<Option<serde_json::Value>> {
        match &alert.condition {
            AlertCondition::Price { op, threshold } => {
                let quote = self.market.get_quote(&alert.symbol).await?;
                if op.matches(quote.price, *threshold) {
                    Ok(Some(serde_json::json!({
                        "price": quote.price,
                        "operator": op.to_string(),
                        "threshold": threshold,
                    })))
                } else {
                    Ok(None)
                }
            }

            AlertCondition::Pattern { target } => {
                let params = format!("days={PATTERN_HISTORY_DAYS}");
                let patterns = match self.cache.get::<Vec<crate::analysis::PatternMatch>>(
                    &alert.symbol,
                    CacheKind::Pattern,
                    &params,
                ) {
                    Some(cached) => cached,
                    None => {
                        let history = self.history(&alert.symbol, PATTERN_HISTORY_DAYS).await?;
                        let detected = self.analyzer.detect_patterns(&history);
                        self.cache
                            .set(&alert.symbol, CacheKind::Pattern, &params, &detected);
                        detected
                    }
                };

                let target = target.to_lowercase();
                let matched = patterns
                    .iter()
                    .find(|p| p.name.to_lowercase().contains(&target));
                Ok(matched.map(|p| {
                    serde_json::json!({"pattern": p.name, "confidence": p.confidence})
                }))
            }

            AlertCondition::Sentiment { target } => {
                let params = format!("days={SENTIMENT_HISTORY_DAYS}");
                let sentiment = match self.cache.get::<SentimentResult>(
                    &alert.symbol,
                    CacheKind::Sentiment,
                    &params,
                ) {
                    Some(cached) => cached,
                    None => {
                        let history = self
                            .history(&alert.symbol, SENTIMENT_HISTORY_DAYS)
                            .await?;
                        let quote = self.market.get_quote(&alert.symbol).await?;
                        let result = self.analyzer.sentiment(&alert.symbol, &history, &quote);
                        self.cache
                            .set(&alert.symbol, CacheKind::Sentiment, &params, &result);
                        result
                    }
                };

                if sentiment
                    .label
                    .as_str()
                    .to_lowercase()
                    .contains(&target.to_lowercase())
                {
                    Ok(Some(serde_json::json!({
                        "label": sentiment.label.as_str(),
                        "score": sentiment.score,
                    })))
                } else {
                    Ok(None)
                }
            }

            AlertCondition::Anomaly => {
                let params = format!("days={SENTIMENT_HISTORY_DAYS}");
                let report = match self.cache.get::<AnomalyReport>(
                    &alert.symbol,
                    CacheKind::Anomaly,
                    &params,
                ) {
                    Some(cached) => cached,
                    None => {
                        let history = self
                            .history(&alert.symbol, SENTIMENT_HISTORY_DAYS)
                            .await?;
                        let quote = self.market.get_quote(&alert.symbol).await?;
                        let report =
                            self.analyzer
                                .detect_anomalies(&alert.symbol, &history, &quote);
                        self.cache
                            .set(&alert.symbol, CacheKind::Anomaly, &params, &report);
                        report
                    }
                };

                if report.total_anomalies > 0 {
                    Ok(Some(serde_json::json!({
                        "total_anomalies": report.total_anomalies,
                    })))
                } else {
                    Ok(None)
                }
            }
        }
    }

    async fn history(
        &self,
        symbol: &str,
        days: i64,
    ) -> Result<Vec<crate::market::HistoricalPoint>> {
        let end = Utc::now();
        let start = end - ChronoDuration::days(days);
        self.market
            .get_historical_quotes(symbol, start, end, HistoricalInterval::Daily)
            .await
    }

    /// Mark the alert triggered, notify, and run its callback
    async fn fire(&self, id: Uuid, data: serde_json::Value) {
        let fired = {
            let mut alerts = self.alerts.write().await;
            match alerts.iter_mut().find(|a| a.id == id) {
                // Guard against double-fire if two checks race
                Some(alert) if !alert.triggered => {
                    alert.triggered = true;
                    alert.triggered_at = Some(Utc::now());
                    alert.last_check = Some(Utc::now());
                    alert.trigger_data = Some(data.clone());
                    Some(alert.clone())
                }
                _ => None,
            }
        };

        let Some(alert) = fired else { return };

        info!(alert = %alert.id, symbol = %alert.symbol, "Alert triggered");

        if let Some(callback) = self.callbacks.read().await.get(&alert.id) {
            callback(&alert, &data);
        }

        if self.config.notifications_enabled {
            let notification = AlertNotification {
                alert_id: alert.id,
                symbol: alert.symbol.clone(),
                message: format!(
                    "{} alert triggered for {}",
                    alert.condition.kind_name(),
                    alert.symbol
                ),
                data,
            };
            if let Err(e) = self.notify_tx.try_send(notification) {
                warn!(error = %e, "Notification dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::types::PriceOp;
    use crate::market::types::{
        GlobalMetrics, HistoricalPoint, Listing, NormalizedQuote, TrendingCoin,
    };
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockMarket {
        prices: StdMutex<Vec<f64>>,
        history: Vec<f64>,
    }

    impl MockMarket {
        fn with_prices(prices: Vec<f64>) -> Self {
            Self {
                prices: StdMutex::new(prices),
                history: vec![1.0; 30],
            }
        }

        fn with_history(history: Vec<f64>) -> Self {
            Self {
                prices: StdMutex::new(vec![1.0]),
                history,
            }
        }

        fn next_price(&self) -> f64 {
            let mut prices = self.prices.lock().unwrap();
            if prices.len() > 1 {
                prices.remove(0)
            } else {
                prices[0]
            }
        }
    }

    #[async_trait]
    impl MarketData for MockMarket {
        async fn get_quote(&self, symbol: &str) -> Result<NormalizedQuote> {
            Ok(NormalizedQuote {
                symbol: symbol.to_string(),
                price: self.next_price(),
                change_24h: 0.0,
                change_7d: None,
                volume_24h: 100.0,
                market_cap: 1000.0,
                last_updated: Utc::now(),
            })
        }

        async fn get_historical_quotes(
            &self,
            _symbol: &str,
            start: DateTime<Utc>,
            _end: DateTime<Utc>,
            _interval: HistoricalInterval,
        ) -> Result<Vec<HistoricalPoint>> {
            Ok(self
                .history
                .iter()
                .enumerate()
                .map(|(i, &price)| HistoricalPoint {
                    timestamp: start + ChronoDuration::days(i as i64),
                    price,
                    volume: 100.0,
                })
                .collect())
        }

        async fn get_listings(&self, _limit: u32, _start: u32) -> Result<Vec<Listing>> {
            Ok(Vec::new())
        }

        async fn get_trending(&self) -> Result<Vec<TrendingCoin>> {
            Ok(Vec::new())
        }

        async fn get_gainers_losers(&self) -> Result<(Vec<TrendingCoin>, Vec<TrendingCoin>)> {
            Ok((Vec::new(), Vec::new()))
        }

        async fn get_global_metrics(&self) -> Result<GlobalMetrics> {
            Ok(GlobalMetrics {
                total_market_cap: 0.0,
                total_volume_24h: 0.0,
                btc_dominance: 0.0,
                eth_dominance: 0.0,
                active_cryptocurrencies: 0,
            })
        }

        async fn get_metadata(&self, _symbol: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        async fn convert(&self, amount: f64, _from: &str, _to: &str) -> Result<f64> {
            Ok(amount)
        }
    }

    fn engine_with(market: MockMarket) -> AlertEngine {
        AlertEngine::new(
            AlertEngineConfig::default(),
            Arc::new(market),
            Analyzer::default(),
            Arc::new(AnalysisCache::new()),
        )
    }

    #[tokio::test]
    async fn test_price_alert_fires_once() {
        // First tick below threshold, second above, later ticks above
        let engine = engine_with(MockMarket::with_prices(vec![49950.0, 50005.0, 50100.0]));
        let fires = Arc::new(AtomicUsize::new(0));

        let alert = Alert::new(
            "BTC",
            AlertCondition::Price {
                op: PriceOp::Above,
                threshold: 50000.0,
            },
        );
        let counter = fires.clone();
        let id = engine
            .add_alert(
                alert,
                Some(Box::new(move |_alert, _data| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await;

        engine.check_all().await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        engine.check_all().await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        // Already-triggered alerts are not re-evaluated
        engine.check_all().await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        let alerts = engine.get_alerts().await;
        let alert = alerts.iter().find(|a| a.id == id).unwrap();
        assert!(alert.triggered);
        assert!(alert.triggered_at.is_some());
        assert_eq!(alert.trigger_data.as_ref().unwrap()["price"], 50005.0);

        engine.clear_all().await;
    }

    #[tokio::test]
    async fn test_add_remove_restores_list() {
        let engine = engine_with(MockMarket::with_prices(vec![1.0]));

        let before = engine.get_alerts().await.len();
        let id = engine
            .add_alert(
                Alert::new(
                    "SOL",
                    AlertCondition::Price {
                        op: PriceOp::Below,
                        threshold: 10.0,
                    },
                ),
                None,
            )
            .await;
        assert_eq!(engine.get_alerts().await.len(), before + 1);

        engine.remove_alert(id).await.unwrap();
        assert_eq!(engine.get_alerts().await.len(), before);

        assert!(matches!(
            engine.remove_alert(id).await,
            Err(Error::AlertNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pattern_alert_substring_match() {
        // Monotonic uptrend produces a "higher highs" pattern
        let history: Vec<f64> = (0..30).map(|i| 1.0 + i as f64 * 0.1).collect();
        let engine = engine_with(MockMarket::with_history(history));

        engine
            .add_alert(
                Alert::new("SOL", AlertCondition::Pattern { target: "HIGHER".into() }),
                None,
            )
            .await;

        engine.check_all().await;
        let alerts = engine.get_alerts().await;
        assert!(alerts[0].triggered, "case-insensitive substring should match");

        engine.clear_all().await;
    }

    #[tokio::test]
    async fn test_anomaly_alert_requires_burst() {
        let flat = engine_with(MockMarket::with_history(vec![1.0; 30]));
        flat.add_alert(Alert::new("SOL", AlertCondition::Anomaly), None)
            .await;
        flat.check_all().await;
        assert!(!flat.get_alerts().await[0].triggered);
        flat.clear_all().await;

        let mut spiky = vec![1.0; 30];
        spiky[14] = 5.0;
        spiky[15] = 1.0;
        let engine = engine_with(MockMarket::with_history(spiky));
        engine
            .add_alert(Alert::new("SOL", AlertCondition::Anomaly), None)
            .await;
        engine.check_all().await;
        assert!(engine.get_alerts().await[0].triggered);
        engine.clear_all().await;
    }

    #[tokio::test]
    async fn test_notifications_delivered() {
        let engine = engine_with(MockMarket::with_prices(vec![60000.0]));
        let mut rx = engine.take_notification_receiver().unwrap();

        engine
            .add_alert(
                Alert::new(
                    "BTC",
                    AlertCondition::Price {
                        op: PriceOp::Above,
                        threshold: 50000.0,
                    },
                ),
                None,
            )
            .await;
        engine.check_all().await;

        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.symbol, "BTC");
        assert!(notification.message.contains("price"));

        engine.clear_all().await;
    }

    #[tokio::test]
    async fn test_stats_by_kind() {
        let engine = engine_with(MockMarket::with_prices(vec![1.0]));
        engine
            .add_alert(
                Alert::new(
                    "BTC",
                    AlertCondition::Price {
                        op: PriceOp::Above,
                        threshold: 1e9,
                    },
                ),
                None,
            )
            .await;
        engine
            .add_alert(Alert::new("SOL", AlertCondition::Anomaly), None)
            .await;

        let stats = engine.get_alert_stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.price, 1);
        assert_eq!(stats.anomaly, 1);
        assert_eq!(stats.pending, 2);

        engine.clear_all().await;
        assert_eq!(engine.get_alert_stats().await.total, 0);
    }
}
