//! Ranked query evaluation (spec §4.6-§4.8): plan construction, phrase/AND
//! resolution, scoring functions, and the OR/THRESHOLD/AND evaluator.

pub mod evaluator;
pub mod listsource;
pub mod phrase;
pub mod plan;
pub mod scoring;

pub use evaluator::{evaluate, EvaluatorConfig, ScoredDoc, SearchOutcome};
pub use plan::{build_conjuncts, order_by_selectivity, Conjunct, ConjunctKind};
pub use scoring::ScoringFunction;
