//! finsight-domain
//!
//! Pure data model for the analysis engine (Transaction, Category, Budget,
//! Goal, periods, and the report-side status types).
//! No I/O, no services. Only data types and core enums.

pub mod budget;
pub mod category;
pub mod common;
pub mod goal;
pub mod report;
pub mod transaction;

pub use budget::*;
pub use category::*;
pub use common::*;
pub use goal::*;
pub use report::*;
pub use transaction::*;
