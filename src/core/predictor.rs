use std::fmt::{Display, Formatter};

use async_trait::async_trait;

use crate::{
    core::{
        decision::{Action, Decision},
        evaluator::{DecisionStrategy, Inputs},
        learner::SharedWeights,
        rules::RuleBased,
    },
    error::EngineError,
    prelude::*,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Recommendation {
    Charge,
    Stop,

    /// No opinion, leave it to the rules.
    Hold,
}

impl Display for Recommendation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Charge => write!(f, "charge"),
            Self::Stop => write!(f, "stop"),
            Self::Hold => write!(f, "hold"),
        }
    }
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Prediction {
    pub recommendation: Recommendation,

    /// `0.0..=1.0`
    pub confidence: f64,
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, inputs: &Inputs) -> Result<Prediction>;
}

/// Prediction-driven strategy.
///
/// A confident charge or stop recommendation replaces the rules' grid decision,
/// anything else defers to the rules. The safety bounds are always checked first.
#[must_use]
pub struct Predictive<P> {
    predictor: P,
    min_confidence: f64,
}

impl<P> Predictive<P> {
    pub const fn new(predictor: P, min_confidence: f64) -> Self {
        Self { predictor, min_confidence }
    }
}

#[async_trait]
impl<P: Predictor> DecisionStrategy for Predictive<P> {
    fn name(&self) -> &'static str {
        "predictive"
    }

    async fn decide(&self, inputs: &Inputs) -> Result<Decision> {
        if let Some(decision) = RuleBased::safety_override(inputs) {
            return Ok(decision.with_strategy(inputs.strategy));
        }
        let prediction = self.predictor.predict(inputs).await.map_err(EngineError::Predictor)?;
        debug!(
            recommendation = %prediction.recommendation,
            confidence = prediction.confidence,
            "predicted",
        );
        if prediction.confidence < self.min_confidence {
            return Ok(RuleBased.evaluate(inputs));
        }
        let action = match prediction.recommendation {
            Recommendation::Charge => Action::ChargeGrid,
            Recommendation::Stop => Action::StopCharging,
            Recommendation::Hold => return Ok(RuleBased.evaluate(inputs)),
        };
        Ok(Decision::new(action, inputs.now)
            .because(format!(
                "predicted {} with confidence {:.2}",
                prediction.recommendation, prediction.confidence,
            ))
            .with_strategy(inputs.strategy))
    }
}

/// Shifts the charge threshold by the learned margin.
///
/// Aggressive strategies apply the full margin, the others half of it. A price between
/// a tightened level and the charge threshold is a stop recommendation, negative prices
/// are left to the rules.
#[must_use]
#[derive(Clone, Debug, bon::Builder)]
pub struct AdaptivePredictor {
    weights: SharedWeights,

    /// Number of observations for the full confidence.
    #[builder(default = 288)]
    warmup: u32,
}

#[async_trait]
impl Predictor for AdaptivePredictor {
    async fn predict(&self, inputs: &Inputs) -> Result<Prediction> {
        let weights = *self.weights.read().await;
        let confidence = weights.confidence(self.warmup);
        if !inputs.strategy.uses_price_thresholds() {
            return Ok(Prediction { recommendation: Recommendation::Hold, confidence });
        }

        let thresholds = &inputs.thresholds;
        let scale = if inputs.strategy.is_aggressive() { 1.0 } else { 0.5 };
        let charge_level = thresholds.charge
            + (thresholds.discharge - thresholds.charge) * (weights.charge_margin * scale);
        let recommendation = if thresholds.current <= charge_level {
            Recommendation::Charge
        } else if thresholds.current <= thresholds.charge && !thresholds.is_negative() {
            // Cheap enough for the rules, but not for the tightened margin.
            Recommendation::Stop
        } else {
            Recommendation::Hold
        };
        Ok(Prediction { recommendation, confidence })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::RwLock;

    use super::*;
    use crate::core::{
        evaluator::{
            Evaluator,
            tests::{inputs_at, snapshot},
        },
        learner::Weights,
        strategy::Strategy,
    };

    struct Fixed(Prediction);

    #[async_trait]
    impl Predictor for Fixed {
        async fn predict(&self, _inputs: &Inputs) -> Result<Prediction> {
            Ok(self.0)
        }
    }

    struct Throwing;

    #[async_trait]
    impl Predictor for Throwing {
        async fn predict(&self, _inputs: &Inputs) -> Result<Prediction> {
            bail!("predictor is broken")
        }
    }

    const fn confident(recommendation: Recommendation) -> Fixed {
        Fixed(Prediction { recommendation, confidence: 0.9 })
    }

    #[tokio::test]
    async fn test_confident_stop_replaces_charge() -> Result {
        let inputs = inputs_at(6.0, snapshot(50.0), Strategy::PriceSensitive);
        let decision =
            Predictive::new(confident(Recommendation::Stop), 0.6).decide(&inputs).await?;
        assert_eq!(decision.action, Action::StopCharging);
        assert_eq!(decision.reasons, ["predicted stop with confidence 0.90"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unconfident_prediction_defers_to_rules() -> Result {
        let inputs = inputs_at(12.0, snapshot(50.0), Strategy::Hybrid);
        let predictor =
            Fixed(Prediction { recommendation: Recommendation::Charge, confidence: 0.1 });
        let decision = Predictive::new(predictor, 0.6).decide(&inputs).await?;
        assert_eq!(decision, RuleBased.evaluate(&inputs));
        Ok(())
    }

    #[tokio::test]
    async fn test_hold_defers_to_rules() -> Result {
        let inputs = inputs_at(20.0, snapshot(60.0), Strategy::Hybrid);
        let decision =
            Predictive::new(confident(Recommendation::Hold), 0.6).decide(&inputs).await?;
        assert_eq!(decision.action, Action::Discharge);
        Ok(())
    }

    #[tokio::test]
    async fn test_safety_is_never_bypassed() -> Result {
        let inputs = inputs_at(6.0, snapshot(96.0), Strategy::PriceSensitive);
        let decision =
            Predictive::new(confident(Recommendation::Charge), 0.6).decide(&inputs).await?;
        assert_eq!(decision.action, Action::StopCharging);
        Ok(())
    }

    #[tokio::test]
    async fn test_throwing_predictor_falls_back_to_rules() {
        let inputs = inputs_at(6.0, snapshot(50.0), Strategy::PriceSensitive);
        let evaluator =
            Evaluator::with_fallback(Predictive::new(Throwing, 0.6), Duration::from_secs(1));
        let expected = Evaluator::deterministic().evaluate(&inputs).await;
        assert_eq!(evaluator.evaluate(&inputs).await, expected);
    }

    #[tokio::test]
    async fn test_adaptive_predictor_margin() -> Result {
        let weights = SharedWeights::default();
        let predictor = AdaptivePredictor::builder().weights(weights.clone()).warmup(10).build();

        // Charge threshold is 9.5 and discharge threshold is 17 at the current price of 10:
        let inputs = inputs_at(10.0, snapshot(50.0), Strategy::PriceSensitive);
        assert_eq!(predictor.predict(&inputs).await?.recommendation, Recommendation::Hold);

        *weights.write().await =
            Weights { charge_margin: Weights::MAX_CHARGE_MARGIN, n_observations: 5 };
        let prediction = predictor.predict(&inputs).await?;
        assert_eq!(prediction.recommendation, Recommendation::Charge);
        assert!((prediction.confidence - 0.5).abs() < f64::EPSILON);

        // Hybrid applies half the margin, which does not reach the current price:
        let inputs = inputs_at(10.0, snapshot(50.0), Strategy::Hybrid);
        assert_eq!(predictor.predict(&inputs).await?.recommendation, Recommendation::Hold);
        Ok(())
    }

    #[tokio::test]
    async fn test_tightened_margin_stops_grid_charging() -> Result {
        let inputs = inputs_at(9.0, snapshot(50.0), Strategy::PriceSensitive);
        assert_eq!(inputs.thresholds.current, inputs.thresholds.charge);
        assert_eq!(RuleBased.evaluate(&inputs).action, Action::ChargeGrid);

        let weights = SharedWeights::new(RwLock::new(Weights {
            charge_margin: -Weights::MAX_CHARGE_MARGIN,
            n_observations: 1000,
        }));
        let predictor = AdaptivePredictor::builder().weights(weights).build();
        let prediction = predictor.predict(&inputs).await?;
        assert_eq!(prediction.recommendation, Recommendation::Stop);
        assert!((prediction.confidence - 1.0).abs() < f64::EPSILON);

        let decision = Predictive::new(predictor, 0.6).decide(&inputs).await?;
        assert_eq!(decision.action, Action::StopCharging);
        Ok(())
    }

    #[tokio::test]
    async fn test_tightened_margin_keeps_negative_price_arbitrage() -> Result {
        let inputs = inputs_at(-3.0, snapshot(50.0), Strategy::PriceSensitive);
        let weights = SharedWeights::new(RwLock::new(Weights {
            charge_margin: -Weights::MAX_CHARGE_MARGIN,
            n_observations: 1000,
        }));
        let predictor = AdaptivePredictor::builder().weights(weights).build();
        let prediction = predictor.predict(&inputs).await?;
        assert_ne!(prediction.recommendation, Recommendation::Stop);
        let decision = Predictive::new(predictor, 0.6).decide(&inputs).await?;
        assert_eq!(decision.action, Action::ChargeGrid);
        Ok(())
    }

    #[tokio::test]
    async fn test_adaptive_predictor_holds_for_self_consumption() -> Result {
        let predictor = AdaptivePredictor::builder().weights(SharedWeights::default()).build();
        let inputs = inputs_at(-2.0, snapshot(50.0), Strategy::SelfConsumption);
        assert_eq!(predictor.predict(&inputs).await?.recommendation, Recommendation::Hold);
        Ok(())
    }
}
