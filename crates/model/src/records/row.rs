use crate::core::value::ScalarValue;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: Arc<str>,
    pub value: ScalarValue,
}

/// One result row after normalization. Field order is the statement's
/// column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedRow {
    fields: Vec<Field>,
}

impl NormalizedRow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: Arc<str>, value: ScalarValue) {
        self.fields.push(Field { name, value });
    }

    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(column))
            .map(|f| &f.value)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn values(&self) -> impl Iterator<Item = &ScalarValue> {
        self.fields.iter().map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(Arc<str>, ScalarValue)> for NormalizedRow {
    fn from_iter<T: IntoIterator<Item = (Arc<str>, ScalarValue)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| Field { name, value })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_column_order_and_looks_up_case_insensitively() {
        let row: NormalizedRow = [
            (Arc::from("id"), ScalarValue::Int(1)),
            (Arc::from("Name"), ScalarValue::from("a")),
            (Arc::from("note"), ScalarValue::Null),
        ]
        .into_iter()
        .collect();

        let names: Vec<&str> = row.fields().iter().map(|f| &*f.name).collect();
        assert_eq!(names, vec!["id", "Name", "note"]);
        assert_eq!(row.get("name"), Some(&ScalarValue::from("a")));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 3);
    }
}
