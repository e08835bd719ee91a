//! # Lodestone
//!
//! Lodestone is an embedded, in-memory document store with a MongoDB style
//! query language and live queries.
//!
//! A live query keeps its results current as the collection changes and
//! reports each change as a small set of callbacks (added, changed, moved,
//! removed) instead of re-running the query.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lodestone::collection::{order_by, ObserveCallbacks, Collection};
//! use lodestone::sort::SortOrder;
//! use lodestone::{doc, val};
//!
//! let people = Collection::new("people");
//! people.insert(doc! { name: "ann", age: 31 })?;
//!
//! let adults = people.find(&val!(doc! { age: { "$gte": 18 } }), order_by("age", SortOrder::Ascending))?;
//! let handle = adults.observe(
//!     ObserveCallbacks::new()
//!         .on_added_at(|doc, index, _| { println!("{} at {:?}", doc, index); Ok(()) })
//!         .on_removed_at(|doc, index| Ok(())),
//! )?;
//!
//! people.insert(doc! { name: "bob", age: 25 })?;
//! handle.stop();
//! ```
//!
//! ## Module Organization
//!
//! - [`collection`] - Collections, cursors, live queries and options
//! - [`common`] - Values, comparison and shared utilities
//! - [`config`] - Collection configuration and builder
//! - [`diff`] - Change computation between two result sets
//! - [`errors`] - Error types and result definitions
//! - [`filter`] - Selector compilation and matching
//! - [`modifier`] - Update modifiers
//! - [`sort`] - Sort specifications and the sorter

pub mod collection;
pub mod common;
pub mod config;
pub mod diff;
pub mod errors;
pub mod filter;
pub mod modifier;
pub mod sort;
