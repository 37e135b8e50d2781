use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{collections::BTreeMap, fs::File, path::Path};

/// What a converted Parquet file contains, as read back from its footer.
#[derive(Debug, Clone)]
pub struct ParquetSummary {
    pub rows: i64,
    pub row_groups: usize,
    pub size_bytes: u64,
    /// `(name, arrow type)` in column order
    pub columns: Vec<(String, String)>,
    pub metadata: BTreeMap<String, String>,
}

pub fn inspect(path: &Path) -> Result<ParquetSummary> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let size_bytes = file.metadata()?.len();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet footer of {}", path.display()))?;

    let meta = builder.metadata();
    let file_meta = meta.file_metadata();
    let metadata = file_meta
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                .collect()
        })
        .unwrap_or_default();

    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| (f.name().clone(), f.data_type().to_string()))
        .collect();

    Ok(ParquetSummary {
        rows: file_meta.num_rows(),
        row_groups: meta.num_row_groups(),
        size_bytes,
        columns,
        metadata,
    })
}

pub fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
        .build()
        .with_context(|| format!("building reader for {}", path.display()))?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading batches from {}", path.display()))
}
