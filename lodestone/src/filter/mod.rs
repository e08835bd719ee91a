//! Selector compilation and document matching.
//!
//! A selector is compiled once into a [Matcher]. Field constraints are
//! resolved with [PathLookup], which follows dotted paths through nested
//! documents and arrays and reports every value found along the way as a
//! [Branch].
mod branched;
mod element;
mod geo;
mod logical;
mod matcher;
mod path_lookup;

pub(crate) use branched::BranchedMatcher;
pub(crate) use element::{Comparison, ElementMatcher, ElementOutcome};
pub(crate) use logical::{DocumentMatcher, MatchRoot};
pub(crate) use matcher::{and_results, Compiler, ElementSelector};

pub use matcher::{
    ids_matched_by_selector, is_operator_object, selector_is_id, selector_is_id_perhaps_as_object,
    MatchResult, Matcher,
};
pub use path_lookup::{
    expand_arrays_in_branches, first_position, ArrayIndex, ArrayIndices, Branch, PathLookup,
};
