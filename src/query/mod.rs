//! Hybrid query execution over a segment snapshot.
//!
//! A [`Plan`] combines an optional scalar predicate with one vector-search
//! leaf. Each [`SearchRequest`] carries its own serialized query vectors and
//! snapshot timestamp; [`execute_search`] runs a batch of them and returns one
//! [`QueryResult`] per request.

pub mod executor;
pub mod placeholder;
pub mod plan;
pub mod predicate;
pub mod result;

pub use executor::{SearchExecutor, SearchRequest, SearchStats, execute_search};
pub use placeholder::PlaceholderGroup;
pub use plan::{CompareOp, DEFAULT_PLACEHOLDER_TAG, Expr, Plan, PlanBuilder, VectorSearchLeaf};
pub use result::QueryResult;
pub use crate::util::topk::SearchHit;
