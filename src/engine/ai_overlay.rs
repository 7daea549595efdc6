//! AI analysis overlay
//!
//! Asks the provider orchestrator for a structured verdict on a token.
//! High-confidence verdicts override the risk-score rule in both
//! directions; anything else falls through to it.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::providers::{ChatMessage, ChatOptions, FallbackOrchestrator};
use crate::scanner::types::TokenCandidate;

/// Verdict emitted by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiVerdict {
    StrongBuy,
    Buy,
    Hold,
    Avoid,
    StrongAvoid,
}

impl AiVerdict {
    pub fn is_buy(&self) -> bool {
        matches!(self, AiVerdict::Buy | AiVerdict::StrongBuy)
    }
}

/// Structured token analysis returned by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub decision: AiVerdict,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub green_flags: Vec<String>,
    #[serde(default)]
    pub suggested_buy_amount_sol: Option<f64>,
    #[serde(default)]
    pub suggested_stop_loss_pct: Option<f64>,
    #[serde(default)]
    pub suggested_take_profit_pct: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
}

/// Outcome of applying the decision rule
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayDecision {
    /// High-confidence buy: execute with the AI's suggested parameters
    Buy {
        amount_sol: Option<f64>,
        stop_loss_frac: Option<f64>,
        take_profit_frac: Option<f64>,
        summary: String,
    },
    /// High-confidence non-buy: veto, do not fall through
    Veto { summary: String },
    /// Low confidence or AI unavailable: use the risk-score rule
    FallThrough,
}

const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Apply the overlay decision rule to an analysis
pub fn apply_decision_rule(analysis: &AiAnalysis) -> OverlayDecision {
    if analysis.confidence < CONFIDENCE_THRESHOLD {
        return OverlayDecision::FallThrough;
    }

    let summary = format!(
        "{:?} ({:.0}% confidence)",
        analysis.decision,
        analysis.confidence * 100.0
    );

    if analysis.decision.is_buy() {
        OverlayDecision::Buy {
            amount_sol: analysis.suggested_buy_amount_sol,
            stop_loss_frac: analysis.suggested_stop_loss_pct.map(|p| p / 100.0),
            take_profit_frac: analysis.suggested_take_profit_pct.map(|p| p / 100.0),
            summary,
        }
    } else {
        OverlayDecision::Veto { summary }
    }
}

/// Token analyzer backed by the provider orchestrator
pub struct AiAnalyzer {
    orchestrator: Arc<FallbackOrchestrator>,
}

impl AiAnalyzer {
    pub fn new(orchestrator: Arc<FallbackOrchestrator>) -> Self {
        Self { orchestrator }
    }

    fn build_prompt(token: &TokenCandidate) -> String {
        format!(
            r#"Analyze this newly launched token and answer with a single JSON object.

Token:
  address: {}
  platform: {}
  symbol: {}
  liquidity_sol: {:?}
  market_cap_sol: {:?}
  holders: {:?}
  volume_24h_sol: {:?}
  verified: {:?}
  age_secs: {}

Respond with JSON only, matching:
{{"decision": "strong_buy|buy|hold|avoid|strong_avoid", "confidence": 0.0,
 "risk_score": 0.0, "red_flags": [], "green_flags": [],
 "suggested_buy_amount_sol": null, "suggested_stop_loss_pct": null,
 "suggested_take_profit_pct": null, "reasoning": ""}}"#,
            token.address,
            token.platform,
            token.display_symbol(),
            token.liquidity_sol,
            token.market_cap_sol,
            token.holders,
            token.volume_24h_sol,
            token.is_verified,
            token.age_secs(),
        )
    }

    /// Strip a markdown code fence if the model wrapped its JSON in one
    fn extract_json(content: &str) -> &str {
        let trimmed = content.trim();
        if let Some(rest) = trimmed.strip_prefix("```") {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            if let Some(end) = rest.rfind("```") {
                return rest[..end].trim();
            }
        }
        trimmed
    }

    /// Request a structured analysis for a token
    pub async fn analyze(&self, token: &TokenCandidate) -> Result<AiAnalysis> {
        let messages = vec![
            ChatMessage::system(
                "You are a launchpad token risk analyst. Answer with strict JSON.",
            ),
            ChatMessage::user(Self::build_prompt(token)),
        ];

        let options = ChatOptions {
            temperature: Some(0.2),
            max_tokens: Some(600),
            ..Default::default()
        };

        let response = self.orchestrator.chat(&messages, &options, None).await?;

        let json = Self::extract_json(&response.content);
        let analysis: AiAnalysis = serde_json::from_str(json).map_err(|e| {
            warn!(provider = %response.provider, error = %e, "AI analysis unparseable");
            Error::ProviderData {
                provider: response.provider.clone(),
                message: format!("analysis decode: {e}"),
            }
        })?;

        debug!(
            token = %token.address,
            decision = ?analysis.decision,
            confidence = analysis.confidence,
            provider = %response.provider,
            "AI analysis complete"
        );

        Ok(analysis)
    }
}
