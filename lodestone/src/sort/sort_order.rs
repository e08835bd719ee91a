use crate::common::Value;

/// Specifies the direction for sorting documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first, following the cross type value order.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortOrder {
    pub fn is_ascending(&self) -> bool {
        matches!(self, SortOrder::Ascending)
    }
}

/// An ordered list of sort fields, built fluently.
///
/// Converts into the array form of a sort specification
/// (`[[path, "asc" | "desc"], ...]`), so repeated paths keep their place.
///
/// # Examples
///
/// ```rust,ignore
/// let spec = SortSpec::new()
///     .add_sorted_field("age", SortOrder::Descending)
///     .add_field("name");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    sorting_order: Vec<(String, SortOrder)>,
}

impl SortSpec {
    pub fn new() -> SortSpec {
        SortSpec {
            sorting_order: Vec::new(),
        }
    }

    #[inline]
    pub fn add_field(self, field_name: &str) -> SortSpec {
        self.add_sorted_field(field_name, SortOrder::Ascending)
    }

    #[inline]
    pub fn add_sorted_field(mut self, field_name: &str, sort_order: SortOrder) -> SortSpec {
        self.sorting_order.push((field_name.to_string(), sort_order));
        self
    }

    pub fn sorting_order(&self) -> &[(String, SortOrder)] {
        &self.sorting_order
    }

    pub fn is_empty(&self) -> bool {
        self.sorting_order.is_empty()
    }
}

impl From<SortSpec> for Value {
    fn from(spec: SortSpec) -> Self {
        Value::Array(
            spec.sorting_order
                .into_iter()
                .map(|(path, order)| {
                    let direction = if order.is_ascending() { "asc" } else { "desc" };
                    Value::Array(vec![Value::from(path), Value::from(direction)])
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::val;

    #[test]
    fn builds_array_form() {
        let spec = SortSpec::new()
            .add_sorted_field("a", SortOrder::Descending)
            .add_field("b");
        assert_eq!(spec.sorting_order().len(), 2);
        assert_eq!(
            Value::from(spec),
            val!(vec![val!(vec!["a", "desc"]), val!(vec!["b", "asc"])])
        );
    }

    #[test]
    fn empty_spec() {
        assert!(SortSpec::default().is_empty());
        assert_eq!(Value::from(SortSpec::new()), Value::Array(vec![]));
    }
}
