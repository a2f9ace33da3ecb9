//! Materialized output row

use serde::Serialize;
use serde_json::Value;

use crate::storage::{Datum, RowId};

/// One output row: a value or null per relation column, in table order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub rowid: RowId,
    pub values: Vec<Option<Datum>>,
}

impl Row {
    pub fn new(rowid: RowId, values: Vec<Option<Datum>>) -> Self {
        Self { rowid, values }
    }

    pub fn get(&self, column: usize) -> Option<&Datum> {
        self.values.get(column).and_then(Option::as_ref)
    }

    pub fn is_null(&self, column: usize) -> bool {
        self.get(column).is_none()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values as a JSON array, nulls as `null`
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.values).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let row = Row::new(5, vec![Some(Datum::Int32(15)), None]);
        assert_eq!(row.get(0), Some(&Datum::Int32(15)));
        assert!(row.is_null(1));
        assert!(row.is_null(7));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_to_json() {
        let row = Row::new(0, vec![Some(Datum::Int64(10)), None, Some(Datum::Text("x".into()))]);
        assert_eq!(row.to_json(), serde_json::json!([10, null, "x"]));
    }
}
