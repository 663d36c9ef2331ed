//! Access to a party's local data partition.
//!
//! The protocol stack only ever needs one query against the local rows:
//! per-class record counts for a candidate split, restricted by the filter
//! chain accumulated on the path from the tree root. [`MemoryDataLayer`] is
//! the bundled in-memory implementation; deployments with their own storage
//! implement [`DataLayer`] instead.

use std::collections::{BTreeMap, HashMap};

use crate::messages::{ClassValue, NodeValuePair};
use crate::tree::Attribute;

/// One record of a horizontally partitioned dataset: attribute name to
/// value, including the class attribute.
pub type Row = HashMap<String, String>;

/// Counting queries against a party's local partition.
pub trait DataLayer: Send + Sync {
    /// Counts the local records per class value, restricted to rows matching
    /// every `(attribute, value)` pair in `path` (applied in order) and
    /// `attr_name == attr_value`.
    ///
    /// The result is deterministic and exhaustive: every class value of the
    /// class attribute appears, zero counts included.
    fn count_per_class_value(
        &self,
        path: &[NodeValuePair],
        attr_name: &str,
        attr_value: &str,
    ) -> BTreeMap<ClassValue, u64>;
}

/// An in-memory [`DataLayer`] over a list of rows.
#[derive(Debug, Clone)]
pub struct MemoryDataLayer {
    rows: Vec<Row>,
    class_attribute: Attribute,
}

impl MemoryDataLayer {
    /// Creates a data layer over `rows`, counting by the values of
    /// `class_attribute`.
    pub fn new(rows: Vec<Row>, class_attribute: Attribute) -> Self {
        MemoryDataLayer {
            rows,
            class_attribute,
        }
    }
}

impl DataLayer for MemoryDataLayer {
    fn count_per_class_value(
        &self,
        path: &[NodeValuePair],
        attr_name: &str,
        attr_value: &str,
    ) -> BTreeMap<ClassValue, u64> {
        let matching: Vec<&Row> = self
            .rows
            .iter()
            .filter(|row| {
                path.iter()
                    .all(|nvp| row.get(&nvp.attribute).is_some_and(|v| *v == nvp.value))
            })
            .filter(|row| row.get(attr_name).is_some_and(|v| v.as_str() == attr_value))
            .collect();

        let class_name = self.class_attribute.name();
        self.class_attribute
            .values()
            .iter()
            .map(|class_value| {
                let count = matching
                    .iter()
                    .filter(|row| row.get(class_name).is_some_and(|v| v == class_value))
                    .count() as u64;
                (ClassValue::from(class_value.as_str()), count)
            })
            .collect()
    }
}
