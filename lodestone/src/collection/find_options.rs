use crate::collection::Document;
use crate::common::Value;
use crate::sort::{SortOrder, SortSpec};

/// Options for a [crate::collection::Cursor].
///
/// `sort` takes any sort specification a [crate::sort::Sorter] accepts.
/// `fields` is an inclusion or exclusion projection. Cursors are reactive
/// by default; a non-reactive cursor delivers its initial results to
/// observers and is never registered as a live query.
///
/// # Examples
///
/// ```rust,ignore
/// use lodestone::collection::{order_by, FindOptions};
/// use lodestone::sort::SortOrder;
///
/// let options = order_by("age", SortOrder::Descending).skip(10).limit(20);
/// let page = FindOptions::new().sort_by("name", SortOrder::Ascending).limit(5);
/// ```
#[derive(Clone, Debug)]
pub struct FindOptions {
    pub(crate) sort: Option<Value>,
    pub(crate) skip: usize,
    pub(crate) limit: Option<usize>,
    pub(crate) fields: Option<Document>,
    pub(crate) reactive: bool,
}

/// Options sorting by one field.
pub fn order_by(field_name: &str, sort_order: SortOrder) -> FindOptions {
    FindOptions::new().sort_by(field_name, sort_order)
}

/// Options skipping the first `skip` results.
pub fn skip_by(skip: usize) -> FindOptions {
    FindOptions::new().skip(skip)
}

/// Options returning at most `limit` results.
pub fn limit_to(limit: usize) -> FindOptions {
    FindOptions::new().limit(limit)
}

/// Options projecting results through `fields`.
pub fn project(fields: Document) -> FindOptions {
    FindOptions::new().fields(fields)
}

impl FindOptions {
    pub fn new() -> FindOptions {
        FindOptions {
            sort: None,
            skip: 0,
            limit: None,
            fields: None,
            reactive: true,
        }
    }

    /// Appends a sort field. Replaces a specification set with [FindOptions::sort]
    /// unless that was built by this method too.
    pub fn sort_by(mut self, field_name: &str, sort_order: SortOrder) -> FindOptions {
        let mut spec = SortSpec::new();
        if let Some(Value::Array(entries)) = &self.sort {
            for entry in entries {
                if let Some([path, direction]) = entry.as_array().map(Vec::as_slice) {
                    let order = if direction.as_str() == Some("desc") {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    };
                    if let Some(path) = path.as_str() {
                        spec = spec.add_sorted_field(path, order);
                    }
                }
            }
        }
        spec = spec.add_sorted_field(field_name, sort_order);
        self.sort = Some(Value::from(spec));
        self
    }

    /// Sets a raw sort specification, such as `doc! { a: 1, b: (-1) }`.
    pub fn sort<T: Into<Value>>(mut self, spec: T) -> FindOptions {
        self.sort = Some(spec.into());
        self
    }

    pub fn skip(mut self, skip: usize) -> FindOptions {
        self.skip = skip;
        self
    }

    /// A limit of zero means no limit.
    pub fn limit(mut self, limit: usize) -> FindOptions {
        self.limit = if limit == 0 { None } else { Some(limit) };
        self
    }

    pub fn fields(mut self, fields: Document) -> FindOptions {
        self.fields = Some(fields);
        self
    }

    pub fn reactive(mut self, reactive: bool) -> FindOptions {
        self.reactive = reactive;
        self
    }

    pub(crate) fn has_skip_or_limit(&self) -> bool {
        self.skip > 0 || self.limit.is_some()
    }
}

impl Default for FindOptions {
    fn default() -> Self {
        FindOptions::new()
    }
}
