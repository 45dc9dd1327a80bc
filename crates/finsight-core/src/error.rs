use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for the analysis engine.
///
/// Cold-start conditions are not errors: immature baselines and
/// zero-elapsed projections surface as statuses, and degenerate arithmetic
/// (zero variance, zero elapsed time) is handled by fallback branches.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),
    #[error("Budget not found: {0}")]
    BudgetNotFound(Uuid),
    #[error("Goal not found: {0}")]
    GoalNotFound(Uuid),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),
    /// Fatal definition-time rejection: cyclic category graph, overlapping
    /// budgets. Never reaches the analytical passes.
    #[error("Configuration rejected: {0}")]
    Configuration(String),
    #[error("Budget {budget_id} is not effective at {as_of}")]
    OutOfRange { budget_id: Uuid, as_of: NaiveDate },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
