//! Assertions over rows.

use crate::row::Row;
use std::collections::HashMap;

/// Count occurrences of each row.
fn multiset(rows: &[Row]) -> HashMap<&Row, usize> {
    let mut counts = HashMap::with_capacity(rows.len());
    for row in rows {
        *counts.entry(row).or_insert(0) += 1;
    }
    counts
}

/// Assert that two row collections hold the same rows the same number of times, in any order.
///
/// # Panics
///
/// Panics listing the rows missing from `actual` and the unexpected extra rows.
pub fn assert_rows_unordered_equal(actual: &[Row], expected: &[Row]) {
    let actual_counts = multiset(actual);
    let expected_counts = multiset(expected);
    if actual_counts == expected_counts {
        return;
    }

    let mut missing = Vec::new();
    for (row, &want) in &expected_counts {
        let have = actual_counts.get(row).copied().unwrap_or(0);
        if have < want {
            missing.push(format!("{row} (x{})", want - have));
        }
    }
    let mut extra = Vec::new();
    for (row, &have) in &actual_counts {
        let want = expected_counts.get(row).copied().unwrap_or(0);
        if have > want {
            extra.push(format!("{row} (x{})", have - want));
        }
    }
    missing.sort();
    extra.sort();
    panic!(
        "Row multiset mismatch:\n  Expected {} rows, got {}\n  Missing: {missing:?}\n  Extra: {extra:?}",
        expected.len(),
        actual.len()
    );
}

/// Assert rows are equal in order.
///
/// # Panics
///
/// Panics at the first differing position or on a length mismatch.
pub fn assert_rows_equal(actual: &[Row], expected: &[Row]) {
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert_eq!(a, e, "Row mismatch at index {i}:\n  Expected: {e}\n  Actual: {a}");
    }
    assert_eq!(
        actual.len(),
        expected.len(),
        "Row count mismatch: expected {}, got {}",
        expected.len(),
        actual.len()
    );
}

/// Assert that no row occurs more than once.
///
/// # Panics
///
/// Panics listing every duplicated row.
pub fn assert_no_duplicate_rows(rows: &[Row]) {
    let mut dupes: Vec<String> = multiset(rows)
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(row, n)| format!("{row} (x{n})"))
        .collect();
    dupes.sort();
    assert!(dupes.is_empty(), "Duplicate rows: {dupes:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Schema};
    use std::sync::Arc;

    fn rows(values: &[i64]) -> Vec<Row> {
        let schema = Arc::new(Schema::builder().add_field("n", FieldType::Int64).build().unwrap());
        values
            .iter()
            .map(|v| Row::new(Arc::clone(&schema), vec![(*v).into()]).unwrap())
            .collect()
    }

    #[test]
    fn test_unordered_equality_respects_multiplicity() {
        assert_rows_unordered_equal(&rows(&[3, 1, 2, 1]), &rows(&[1, 1, 2, 3]));
    }

    #[test]
    #[should_panic(expected = "Row multiset mismatch")]
    fn unordered_equality_detects_missing_duplicate() {
        assert_rows_unordered_equal(&rows(&[1, 2, 3]), &rows(&[1, 1, 2, 3]));
    }

    #[test]
    #[should_panic(expected = "Duplicate rows")]
    fn duplicates_are_reported() {
        assert_no_duplicate_rows(&rows(&[1, 2, 2]));
    }
}
