//! Evaluation of scalar predicate trees into row bitsets.

use bit_vec::BitVec;

use crate::error::{Result, SegcoreError};
use crate::query::plan::{CompareOp, Expr};
use crate::schema::FieldId;
use crate::segment::SegmentReader;
use crate::storage::{ColumnData, ScalarValue};

/// Check that every field the predicate touches exists, is a scalar field
/// whose type is comparable with the literals, and has its data loaded.
pub fn check_predicate<S: SegmentReader + ?Sized>(expr: &Expr, segment: &S) -> Result<()> {
    match expr {
        Expr::Compare {
            field_id, value, ..
        } => check_literals(segment, *field_id, std::slice::from_ref(value)),
        Expr::Range {
            field_id,
            conditions,
        } => {
            let literals: Vec<ScalarValue> = conditions.iter().map(|(_, v)| *v).collect();
            check_literals(segment, *field_id, &literals)
        }
        Expr::Term { field_id, values } => check_literals(segment, *field_id, values),
        Expr::And(children) | Expr::Or(children) => children
            .iter()
            .try_for_each(|child| check_predicate(child, segment)),
        Expr::Not(child) => check_predicate(child, segment),
    }
}

fn check_literals<S: SegmentReader + ?Sized>(
    segment: &S,
    field_id: FieldId,
    literals: &[ScalarValue],
) -> Result<()> {
    let column = scalar_column(segment, field_id)?;
    for literal in literals {
        if !literal.is_comparable_with(column.data_type()) {
            return Err(SegcoreError::type_mismatch(
                column.data_type().name(),
                literal.type_name(),
            ));
        }
    }
    Ok(())
}

fn scalar_column<S: SegmentReader + ?Sized>(segment: &S, field_id: FieldId) -> Result<&ColumnData> {
    let offset = segment.field_map().require_offset(field_id)?;
    let meta = segment
        .schema()
        .field(offset)
        .ok_or_else(|| SegcoreError::schema_mismatch(format!("Unknown field id {field_id}")))?;
    if meta.is_vector() {
        return Err(SegcoreError::type_mismatch("scalar", meta.data_type().name()));
    }
    segment.column(offset).ok_or_else(|| {
        SegcoreError::not_loaded(format!("Field '{}' is not loaded", meta.name()))
    })
}

/// Evaluate `expr` over rows `[0, scan_len)`.
pub fn evaluate<S: SegmentReader + ?Sized>(
    expr: &Expr,
    segment: &S,
    scan_len: usize,
) -> Result<BitVec> {
    match expr {
        Expr::Compare {
            field_id,
            op,
            value,
        } => filter_column(segment, *field_id, scan_len, |v| satisfies(v, *op, value)),
        Expr::Range {
            field_id,
            conditions,
        } => filter_column(segment, *field_id, scan_len, |v| {
            conditions.iter().all(|(op, literal)| satisfies(v, *op, literal))
        }),
        Expr::Term { field_id, values } => filter_column(segment, *field_id, scan_len, |v| {
            values.iter().any(|literal| satisfies(v, CompareOp::Eq, literal))
        }),
        Expr::And(children) => {
            let mut bits = BitVec::from_elem(scan_len, true);
            for child in children {
                bits.and(&evaluate(child, segment, scan_len)?);
            }
            Ok(bits)
        }
        Expr::Or(children) => {
            let mut bits = BitVec::from_elem(scan_len, false);
            for child in children {
                bits.or(&evaluate(child, segment, scan_len)?);
            }
            Ok(bits)
        }
        Expr::Not(child) => {
            let mut bits = evaluate(child, segment, scan_len)?;
            bits.negate();
            Ok(bits)
        }
    }
}

#[inline]
fn satisfies(value: ScalarValue, op: CompareOp, literal: &ScalarValue) -> bool {
    value.compare(literal).is_some_and(|ordering| op.test(ordering))
}

fn filter_column<S, P>(segment: &S, field_id: FieldId, scan_len: usize, pred: P) -> Result<BitVec>
where
    S: SegmentReader + ?Sized,
    P: Fn(ScalarValue) -> bool,
{
    let column = scalar_column(segment, field_id)?;
    let mut bits = BitVec::from_elem(scan_len, false);
    column.for_each_scalar(scan_len, |row, value| {
        if pred(value) {
            bits.set(row, true);
        }
    })?;
    Ok(bits)
}
