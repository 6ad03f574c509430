//! Equality predicates for repository lookups

use ks_shared::types::SortOrder;

use super::value::Value;

/// Conjunction of `field = value` conditions, with optional ordering
///
/// A `Value::Null` condition matches rows where the field is NULL. Without
/// [`Filter::order_by`] the order of matching rows is unspecified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
    order_by: Option<(String, SortOrder)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `field = value` condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Order matching rows by `field`
    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order_by
            .as_ref()
            .map(|(field, order)| (field.as_str(), *order))
    }

    /// Field names referenced by conditions and ordering
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|(field, _)| field.as_str())
            .chain(self.order_by.iter().map(|(field, _)| field.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Conditions as a JSON object, used as lookup context in errors
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.conditions
                .iter()
                .map(|(field, value)| (field.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = Filter::new()
            .eq("status", "pending")
            .eq("archived_at", Value::Null)
            .order_by("created_at", SortOrder::Desc);

        assert_eq!(filter.conditions().len(), 2);
        assert_eq!(filter.ordering(), Some(("created_at", SortOrder::Desc)));
        let fields: Vec<&str> = filter.fields().collect();
        assert_eq!(fields, vec!["status", "archived_at", "created_at"]);
        assert!(!filter.is_empty());
    }

    #[test]
    fn test_filter_json() {
        let filter = Filter::new().eq("id", 9).eq("status", "pending");
        assert_eq!(filter.to_json(), serde_json::json!({"id": 9, "status": "pending"}));
        assert!(Filter::new().is_empty());
    }
}
