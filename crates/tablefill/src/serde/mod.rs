//! Wire representations, enabled by the `serde` feature.
//!
//! A [`Table`] serializes as a nested array of rows, which is what clients of
//! the fill service expect:
//!
//! ```
//! let mut table = tablefill::Table::new(2, 3);
//! table.fill_range(1, 2, 7);
//! let json = serde_json::to_string(&table).unwrap();
//! assert_eq!(json, "[[0,0,0],[7,7,7]]");
//! ```

mod response;

pub use response::*;

use crate::{Cell, Table};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as _,
    ser::SerializeSeq,
};

impl Serialize for Table {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = s.serialize_seq(Some(self.rows()))?;
        for row in self.rows_iter() {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Table {
    /// Rebuilds a table from nested rows.
    ///
    /// # Errors
    ///
    /// Fails if the rows are not all the same length. An empty array decodes
    /// to a `0 x 0` table.
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nested = Vec::<Vec<Cell>>::deserialize(d)?;
        let rows = nested.len();
        let cols = nested.first().map_or(0, Vec::len);
        if let Some((i, row)) = nested.iter().enumerate().find(|(_, r)| r.len() != cols) {
            return Err(D::Error::custom(format!(
                "row {i} has {} cells, expected {cols}",
                row.len()
            )));
        }

        let cells = nested.into_iter().flatten().collect();
        Ok(Self::from_parts(rows, cols, cells))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FillRequest;

    #[test]
    fn table_round_trips_through_json() {
        let mut table = Table::new(3, 2);
        table.fill_column_range(1, 2, 4);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, "[[0,4],[0,4],[0,4]]");
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn rows_without_columns_keep_their_count() {
        let table = Table::new(2, 0);
        assert_eq!(serde_json::to_string(&table).unwrap(), "[[],[]]");
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = serde_json::from_str::<Table>("[[1,2],[3]]").unwrap_err();
        assert!(err.to_string().contains("row 1 has 1 cells"));
    }

    #[test]
    fn request_uses_num_threads_on_the_wire() {
        let request: FillRequest =
            serde_json::from_str(r#"{"rows": 3, "cols": 4, "num_threads": 2}"#).unwrap();
        assert_eq!(request, FillRequest::new(3, 4, 2));

        let json = serde_json::to_value(request).unwrap();
        assert_eq!(json["num_threads"], 2);
    }

    #[test]
    fn request_accepts_threads_alias() {
        let request: FillRequest =
            serde_json::from_str(r#"{"rows": 1, "cols": 1, "threads": 5}"#).unwrap();
        assert_eq!(request.threads, 5);
    }

    #[test]
    fn request_keeps_negative_values_for_validation() {
        let request: FillRequest =
            serde_json::from_str(r#"{"rows": -1, "cols": 4, "num_threads": 0}"#).unwrap();
        assert_eq!(request, FillRequest::new(-1, 4, 0));
    }

    #[test]
    fn request_rejects_non_numeric_fields() {
        assert!(
            serde_json::from_str::<FillRequest>(r#"{"rows": 1, "cols": 1, "num_threads": "x"}"#)
                .is_err()
        );
    }
}
