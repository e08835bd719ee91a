//! Documents, collections and live queries.
//!
//! A [Collection] holds documents keyed by their `_id`. Queries are run
//! through a [Cursor], which can either fetch the current results or
//! observe them: an observation delivers the initial results as adds and
//! then every later change as a small set of callbacks.
//!
//! ```rust,ignore
//! use lodestone::collection::{order_by, ChangeCallbacks, Collection};
//! use lodestone::sort::SortOrder;
//! use lodestone::{doc, val};
//!
//! let scores = Collection::new("scores");
//! scores.insert(doc! { player: "ann", points: 10 })?;
//!
//! let top = scores.find(&val!(doc! {}), order_by("points", SortOrder::Descending).limit(3))?;
//! let handle = top.observe_changes(
//!     ChangeCallbacks::new()
//!         .on_added_before(|id, fields, before| Ok(()))
//!         .on_moved_before(|id, before| Ok(()))
//!         .on_removed(|id| Ok(())),
//! )?;
//!
//! scores.update(&val!(doc! { player: "ann" }), &doc! { "$inc": { points: 5 } }, &Default::default())?;
//! handle.stop();
//! ```
mod cursor;
mod document;
mod document_id;
mod find_options;
mod id_generator;
mod live_collection;
mod live_query;
mod object_id;
mod observe_queue;
mod observer;
mod projection;
mod update_options;

pub use cursor::Cursor;
pub use document::*;
pub use document_id::DocumentId;
pub use find_options::*;
pub use id_generator::*;
pub use live_collection::{Collection, Originals, UpdateResult};
pub use live_query::QueryHandle;
pub use object_id::ObjectId;
pub use observer::{ChangeCallbacks, ObserveCallbacks};
pub use projection::Projection;
pub use update_options::*;
