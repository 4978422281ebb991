//! Sort-merge row comparison.
//!
//! Both sides of a chunk are sorted with the same two-part comparator
//! (key columns first, remaining columns second), then merged with two
//! cursors. Complexity is bounded by chunk size, never table size.
//!
//! Values compare as raw bytes with two exceptions: NULL orders before any
//! value, and date/time columns are parsed and compared as instants so the
//! same moment written in different textual shapes does not produce a
//! spurious update.

use std::cmp::Ordering;

use chrono::NaiveDateTime;

use crate::core::{ChunkPair, ColumnInfo, DmlOp, Field, RowRecord};
use crate::schema::TableMeta;

/// Parse a date/time value in either of the two accepted textual forms.
fn parse_instant(bytes: &[u8]) -> Option<NaiveDateTime> {
    let s = std::str::from_utf8(bytes).ok()?;
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Compare one column value pair. NULL sorts before any value.
fn compare_fields(a: &Field, b: &Field, col: &ColumnInfo) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => {
            if col.is_datetime() {
                if let (Some(ix), Some(iy)) = (parse_instant(x), parse_instant(y)) {
                    return ix.cmp(&iy);
                }
            }
            x.cmp(y)
        }
    }
}

/// Compare the key columns of two rows.
fn compare_keys(meta: &TableMeta, a: &RowRecord, b: &RowRecord) -> Ordering {
    for &i in &meta.pk_cols {
        let ord = compare_fields(&a.fields[i], &b.fields[i], &meta.columns[i]);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compare the non-key columns of two rows.
fn compare_rest(meta: &TableMeta, a: &RowRecord, b: &RowRecord) -> Ordering {
    for (i, col) in meta.columns.iter().enumerate() {
        if meta.pk_cols.contains(&i) {
            continue;
        }
        let ord = compare_fields(&a.fields[i], &b.fields[i], col);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_rows(meta: &TableMeta, a: &RowRecord, b: &RowRecord) -> Ordering {
    compare_keys(meta, a, b).then_with(|| compare_rest(meta, a, b))
}

enum Step {
    Insert,
    Delete,
    Update,
    Skip,
    Done,
}

/// Diff one chunk pair into the edits that make the destination range
/// identical to the source range.
pub fn diff_chunk(meta: &TableMeta, pair: ChunkPair) -> Vec<DmlOp> {
    let table_id = meta.table_id;
    let mut source = pair.source_rows;
    let mut dest = pair.dest_rows;
    source.sort_by(|a, b| compare_rows(meta, a, b));
    dest.sort_by(|a, b| compare_rows(meta, a, b));

    let mut ops = Vec::new();
    let mut s = source.into_iter().peekable();
    let mut d = dest.into_iter().peekable();

    loop {
        let step = match (s.peek(), d.peek()) {
            (None, None) => Step::Done,
            (Some(_), None) => Step::Insert,
            (None, Some(_)) => Step::Delete,
            (Some(a), Some(b)) => match compare_keys(meta, a, b) {
                Ordering::Less => Step::Insert,
                Ordering::Greater => Step::Delete,
                Ordering::Equal => {
                    if compare_rest(meta, a, b) == Ordering::Equal {
                        Step::Skip
                    } else {
                        Step::Update
                    }
                }
            },
        };
        match step {
            Step::Insert => {
                if let Some(row) = s.next() {
                    ops.push(DmlOp::insert(table_id, row));
                }
            }
            Step::Delete => {
                if let Some(row) = d.next() {
                    ops.push(DmlOp::delete(table_id, row));
                }
            }
            Step::Update => {
                if let (Some(new_row), Some(match_row)) = (s.next(), d.next()) {
                    ops.push(DmlOp::update(table_id, new_row, match_row));
                }
            }
            Step::Skip => {
                s.next();
                d.next();
            }
            Step::Done => break,
        }
    }
    ops
}
