use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use clap::ValueEnum;
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, GzipLevel, ZstdLevel},
    file::{metadata::KeyValue, properties::WriterProperties},
};
use serde::{Deserialize, Serialize};
use std::{fs, fs::File, path::Path};
use tracing::debug;

/// Parquet page compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    None,
}

impl Codec {
    pub fn compression(self) -> Compression {
        match self {
            Codec::Snappy => Compression::SNAPPY,
            Codec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            Codec::Gzip => Compression::GZIP(GzipLevel::default()),
            Codec::None => Compression::UNCOMPRESSED,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub codec: Codec,
    /// Extra key/value pairs stored in the Parquet footer.
    pub metadata: Vec<(String, String)>,
}

impl WriteOptions {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    fn properties(&self) -> WriterProperties {
        let kv: Vec<KeyValue> = self
            .metadata
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        WriterProperties::builder()
            .set_compression(self.codec.compression())
            .set_key_value_metadata(if kv.is_empty() { None } else { Some(kv) })
            .build()
    }
}

/// Write `batch` to `dest` as a single Parquet file and return its size on disk.
///
/// The file is written to `.<name>.tmp` next to `dest` and renamed into place,
/// so a half-written file never carries the final name.
pub fn write_parquet(batch: &RecordBatch, dest: &Path, opts: &WriteOptions) -> Result<u64> {
    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid output path {}", dest.display()))?;
    let tmp_path = dest.with_file_name(format!(".{}.tmp", file_name));

    let result = write_to(batch, &tmp_path, opts);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result?;

    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "renaming {} -> {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    let bytes = fs::metadata(dest)
        .with_context(|| format!("stat {}", dest.display()))?
        .len();
    debug!(path = %dest.display(), bytes, rows = batch.num_rows(), "parquet written");
    Ok(bytes)
}

fn write_to(batch: &RecordBatch, path: &Path, opts: &WriteOptions) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating parquet file {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(opts.properties()))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
