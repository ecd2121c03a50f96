//! Search functionality: the query model, matchers, ranking and the
//! planner that ties them to the index and the result cache.

pub mod fuzzy;
pub mod matchers;
pub mod planner;
pub mod query;
pub mod ranker;

pub use matchers::{Matcher, RegexCache};
pub use planner::{QueryPlanner, SearchOutcome, SearchStats};
pub use query::SearchQuery;
pub use ranker::Ranker;
