use crate::sheet::{is_integral, Cell, SheetTable};
use anyhow::{bail, Context, Result};
use arrow::{
    array::{
        ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder,
        TimestampMillisecondBuilder,
    },
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Arrow type a spreadsheet column ends up as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Int64,
    Float64,
    Timestamp,
    Utf8,
}

impl ColumnKind {
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnKind::Utf8 => DataType::Utf8,
        }
    }
}

/// Infer a column's type from its non-null cells.
///
/// Whole numbers give `Int64`, any fractional value widens the column to
/// `Float64`, and a mix of unrelated kinds (or any text) falls back to `Utf8`.
pub fn infer_kind<'a, I>(cells: I) -> ColumnKind
where
    I: IntoIterator<Item = &'a Cell>,
{
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let this = match cell {
            Cell::Empty | Cell::Error(_) => continue,
            Cell::Text(_) => return ColumnKind::Utf8,
            Cell::Bool(_) => ColumnKind::Boolean,
            Cell::Int(_) => ColumnKind::Int64,
            Cell::Float(f) if is_integral(*f) => ColumnKind::Int64,
            Cell::Float(_) => ColumnKind::Float64,
            Cell::DateTime(_) => ColumnKind::Timestamp,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int64), ColumnKind::Float64)
            | (Some(ColumnKind::Float64), ColumnKind::Int64) => ColumnKind::Float64,
            _ => return ColumnKind::Utf8,
        });
    }
    kind.unwrap_or(ColumnKind::Utf8)
}

/// Final Arrow schema for a sheet, plus the kind of every column.
pub struct SchemaInfo {
    pub schema: Schema,
    pub kinds: Vec<ColumnKind>,
}

pub fn infer_schema(table: &SheetTable) -> SchemaInfo {
    let kinds: Vec<ColumnKind> = (0..table.headers.len())
        .map(|col| infer_kind(table.rows.iter().map(|r| &r[col])))
        .collect();
    let fields: Vec<Field> = table
        .headers
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| Field::new(name, kind.data_type(), true))
        .collect();
    SchemaInfo {
        schema: Schema::new(fields),
        kinds,
    }
}

/// Build a single `RecordBatch` holding every data row of `table`.
pub fn to_record_batch(table: &SheetTable) -> Result<RecordBatch> {
    if table.is_empty() {
        bail!("sheet {:?} has no header row", table.sheet_name);
    }

    let info = infer_schema(table);
    let mut columns = Vec::with_capacity(info.kinds.len());

    for (col, kind) in info.kinds.iter().enumerate() {
        let cells = table.rows.iter().map(|r| &r[col]);
        for (row, cell) in table.rows.iter().map(|r| &r[col]).enumerate() {
            if let Cell::Error(e) = cell {
                // spreadsheet row number: 1-based, header is row 1
                warn!(
                    sheet = %table.sheet_name,
                    column = %table.headers[col],
                    row = row + 2,
                    error = %e,
                    "error cell stored as null"
                );
            }
        }

        let array: ArrayRef = match kind {
            ColumnKind::Boolean => {
                let mut b = BooleanBuilder::with_capacity(table.rows.len());
                for cell in cells {
                    b.append_option(match cell {
                        Cell::Bool(v) => Some(*v),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            ColumnKind::Int64 => {
                let mut b = Int64Builder::with_capacity(table.rows.len());
                for cell in cells {
                    b.append_option(match cell {
                        Cell::Int(v) => Some(*v),
                        Cell::Float(f) => Some(*f as i64),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            ColumnKind::Float64 => {
                let mut b = Float64Builder::with_capacity(table.rows.len());
                for cell in cells {
                    b.append_option(match cell {
                        Cell::Int(v) => Some(*v as f64),
                        Cell::Float(f) => Some(*f),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            ColumnKind::Timestamp => {
                let mut b = TimestampMillisecondBuilder::with_capacity(table.rows.len());
                for cell in cells {
                    b.append_option(match cell {
                        Cell::DateTime(dt) => Some(dt.and_utc().timestamp_millis()),
                        _ => None,
                    });
                }
                Arc::new(b.finish())
            }
            ColumnKind::Utf8 => {
                let mut b = StringBuilder::new();
                for cell in cells {
                    b.append_option(cell.render());
                }
                Arc::new(b.finish())
            }
        };
        columns.push(array);
    }

    debug!(
        sheet = %table.sheet_name,
        rows = table.rows.len(),
        kinds = ?info.kinds,
        "built record batch"
    );

    RecordBatch::try_new(Arc::new(info.schema), columns)
        .with_context(|| format!("assembling record batch for sheet {:?}", table.sheet_name))
}
