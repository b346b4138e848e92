// Domain modules
pub mod error;
pub mod filter;
pub mod grouping;
pub mod model;
pub mod winner;

pub use error::{BenchGridError, Result};
pub use filter::{selected_backends, RowFilter};
pub use grouping::{context_label, ContextGroup, ModelRow, ResultSet, TestGroup};
pub use model::{Build, ErrorType, Measurement, Meta, ResultsDoc, Run, DEFAULT_CTX};
pub use winner::{select_winners, Candidate, K_SIGMA, MIN_TOL};
