//! Instance selection
//!
//! Matchers compare a single string field; selectors combine matchers over
//! name, provider, region, engine and tags into an instance predicate.

mod evaluator;
mod matcher;


pub use evaluator::{
    match_instance, schedule_matches, selector_matches, validate_selectors, CompiledSelector,
    SelectorOperator,
};
pub use matcher::{matches, CompiledMatcher};
