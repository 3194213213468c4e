mod context;
mod eval_experiment;
mod eval_feature;
mod evaluator;

pub use context::{EvalOptions, UserContext};
pub use eval_experiment::run_experiment;
pub use eval_feature::eval_feature;
pub use evaluator::{Evaluator, EvaluatorConfig};
