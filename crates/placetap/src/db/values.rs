//! Builds multi-row `VALUES` clauses together with their bindings.
//!
//! Placeholders are positional (`?N`) and numbered after any leading shared
//! parameters, so a statement can bind e.g. `?1 = job_id` once and then one
//! group of placeholders per row.

use super::{DatabaseError, Value};

/// Accumulates typed rows for a fixed column list.
#[derive(Debug)]
pub struct ValuesBuilder {
    width: usize,
    next_index: usize,
    groups: Vec<String>,
    params: Vec<Value>,
}

impl ValuesBuilder {
    /// Starts a clause for rows of `width` columns whose first placeholder is
    /// `?{first_index}`.
    pub fn new(width: usize, first_index: usize) -> Self {
        Self {
            width,
            next_index: first_index,
            groups: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Starts a clause that follows the given leading parameters.
    pub fn after(leading: &[Value], width: usize) -> Self {
        Self::new(width, leading.len() + 1)
    }

    /// Appends one row. The row must have exactly `width` values.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), DatabaseError> {
        if row.len() != self.width {
            return Err(DatabaseError::Arity {
                expected: self.width,
                actual: row.len(),
            });
        }
        let placeholders: Vec<String> = (0..self.width)
            .map(|offset| format!("?{}", self.next_index + offset))
            .collect();
        self.groups.push(format!("({})", placeholders.join(", ")));
        self.next_index += self.width;
        self.params.extend(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the `(...), (...)` clause and the bindings in placeholder order.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.groups.join(",\n    "), self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_follow_leading_params() {
        let leading = vec![Value::from("job-1")];
        let mut values = ValuesBuilder::after(&leading, 2);
        values
            .push_row(vec![Value::from("85001"), Value::from(1i64)])
            .unwrap();
        values
            .push_row(vec![Value::from("85002"), Value::from(2i64)])
            .unwrap();
        assert_eq!(values.len(), 2);

        let (clause, params) = values.finish();
        assert_eq!(clause, "(?2, ?3),\n    (?4, ?5)");
        assert_eq!(
            params,
            vec![
                Value::from("85001"),
                Value::from(1i64),
                Value::from("85002"),
                Value::from(2i64),
            ]
        );
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let mut values = ValuesBuilder::new(3, 1);
        let err = values.push_row(vec![Value::from("85001")]).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Arity {
                expected: 3,
                actual: 1
            }
        ));
        assert!(values.is_empty());
    }

    #[test]
    fn test_empty_builder() {
        let values = ValuesBuilder::new(2, 1);
        let (clause, params) = values.finish();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }
}
