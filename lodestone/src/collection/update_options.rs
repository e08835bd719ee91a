use crate::common::Value;

/// Options for [crate::collection::Collection::update].
///
/// # Examples
///
/// ```rust,ignore
/// use lodestone::collection::{multi, upsert, UpdateOptions};
///
/// let every_match = multi();
/// let insert_when_missing = upsert().inserted_id("fixed-id");
/// let both = UpdateOptions::new(true, true);
/// ```
#[derive(Clone, Debug, Default)]
pub struct UpdateOptions {
    multi: bool,
    upsert: bool,
    inserted_id: Option<Value>,
}

impl UpdateOptions {
    pub fn new(multi: bool, upsert: bool) -> Self {
        UpdateOptions {
            multi,
            upsert,
            inserted_id: None,
        }
    }

    /// Update every matching document instead of the first one.
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// Insert a document built from the selector and modifier when nothing
    /// matches.
    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    /// The `_id` of an upserted document that gets none from the selector
    /// or modifier.
    pub fn inserted_id<T: Into<Value>>(mut self, id: T) -> Self {
        self.inserted_id = Some(id.into());
        self
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn is_upsert(&self) -> bool {
        self.upsert
    }

    pub fn get_inserted_id(&self) -> Option<&Value> {
        self.inserted_id.as_ref()
    }
}

/// Options updating every matching document.
pub fn multi() -> UpdateOptions {
    UpdateOptions::new(true, false)
}

/// Options inserting when nothing matches.
pub fn upsert() -> UpdateOptions {
    UpdateOptions::new(false, true)
}
