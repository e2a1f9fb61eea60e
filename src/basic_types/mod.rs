mod contradiction;
mod cost;
mod solution;

pub use contradiction::Contradiction;
pub use contradiction::PropagationStatus;
pub use cost::decimal_to_cost;
pub use cost::format_cost;
pub use cost::probability_to_cost;
pub use cost::saturating_add;
pub use cost::saturating_mul;
pub use cost::Cost;
pub use cost::CostScale;
pub use cost::OverflowError;
pub use cost::MAX_COST;
pub use cost::MIN_COST;
pub use solution::Solution;
