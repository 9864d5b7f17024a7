//! Cross-module integration scenarios.

pub mod churn;
pub mod persistence;
