pub mod analyzer;
pub mod battery;
pub mod decision;
pub mod evaluator;
pub mod forecast;
pub mod learner;
pub mod predictor;
pub mod rules;
pub mod snapshot;
pub mod strategy;
