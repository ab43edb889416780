//! Query descriptor and the builder that derives it from URL parameters.

mod builder;
mod params;
mod predicate;

pub use builder::{parse_date, QueryBuilder, LIMIT_PARAM, PAGE_PARAM, SEARCH_PARAM};
pub use params::QueryParams;
pub use predicate::{Condition, Operand, OrderBy, Predicate, Query};
