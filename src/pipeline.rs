use crate::{
    config::Settings,
    convert::to_record_batch,
    sheet::{read_sheet, SheetSelector},
    upload::ObjectStore,
    write::{write_parquet, Codec, WriteOptions},
};
use anyhow::{anyhow, bail, Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

/// What happened to a file after conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded,
    SkippedExisting,
    SkippedEmpty,
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub sheet: String,
    /// `None` when the sheet was empty and nothing was written
    pub output: Option<PathBuf>,
    pub object_key: Option<String>,
    pub rows: usize,
    pub columns: usize,
    pub bytes: u64,
    pub outcome: UploadOutcome,
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub files_seen: usize,
    pub converted: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub rows: u64,
    pub bytes: u64,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn record(&mut self, report: FileReport) {
        self.files_seen += 1;
        if report.output.is_some() {
            self.converted += 1;
        }
        match report.outcome {
            UploadOutcome::Uploaded => self.uploaded += 1,
            UploadOutcome::SkippedExisting | UploadOutcome::SkippedEmpty => self.skipped += 1,
            UploadOutcome::DryRun => {}
        }
        self.rows += report.rows as u64;
        self.bytes += report.bytes;
        self.files.push(report);
    }
}

/// Local half of a file's processing: sheet read and Parquet written.
#[derive(Debug)]
pub struct Conversion {
    pub sheet: String,
    pub rows: usize,
    pub columns: usize,
    /// Output path and size; `None` for a sheet with no header row
    pub parquet: Option<(PathBuf, u64)>,
}

/// Spreadsheets directly inside `dir` whose extension matches one of
/// `extensions` (case-insensitive), sorted by name. Office lock files
/// (`~$name.xlsx`) are skipped.
pub fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let opts = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };
    let base = Pattern::escape(&dir.display().to_string());

    let mut found = BTreeSet::new();
    for ext in extensions {
        let pattern = format!("{}/*.{}", base, Pattern::escape(ext));
        for entry in glob_with(&pattern, opts).context("invalid glob pattern")? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "cannot read directory entry");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            let lock_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("~$"));
            if lock_file {
                debug!(file = %path.display(), "skipping office lock file");
                continue;
            }
            found.insert(path);
        }
    }
    Ok(found.into_iter().collect())
}

/// Every input maps to `<stem>.parquet`, so two inputs sharing a stem
/// (`a.xlsx` and `a.xlsm`) would write the same local file and object key.
pub fn check_output_names(files: &[PathBuf]) -> Result<()> {
    let mut by_stem: BTreeMap<&std::ffi::OsStr, &Path> = BTreeMap::new();
    for path in files {
        let stem = path
            .file_stem()
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
        if let Some(first) = by_stem.insert(stem, path) {
            bail!(
                "{} and {} would both be written as {}.parquet",
                first.display(),
                path.display(),
                stem.to_string_lossy()
            );
        }
    }
    Ok(())
}

/// Read the selected sheet of `path` and write `<stem>.parquet` into `output_dir`.
#[instrument(level = "info", skip_all, fields(file = %path.display()))]
pub fn convert_file(
    path: &Path,
    output_dir: &Path,
    selector: &SheetSelector,
    codec: Codec,
) -> Result<Conversion> {
    info!("reading {}", path.display());
    let table = read_sheet(path, selector)?;

    if table.is_empty() {
        warn!(sheet = %table.sheet_name, "sheet is empty, nothing to convert");
        return Ok(Conversion {
            sheet: table.sheet_name,
            rows: 0,
            columns: 0,
            parquet: None,
        });
    }

    let batch = to_record_batch(&table)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("file name of {} is not valid UTF-8", path.display()))?;
    let output = output_dir.join(format!("{}.parquet", stem));

    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let opts = WriteOptions::new(codec)
        .with_metadata("sheetlake.source", source_name)
        .with_metadata("sheetlake.sheet", table.sheet_name.clone());

    info!("writing parquet to {}", output.display());
    let bytes = write_parquet(&batch, &output, &opts)?;

    Ok(Conversion {
        sheet: table.sheet_name,
        rows: batch.num_rows(),
        columns: batch.num_columns(),
        parquet: Some((output, bytes)),
    })
}

/// Convert and upload one file. Conversion runs on the blocking pool.
pub async fn process_file(
    settings: &Settings,
    store: &dyn ObjectStore,
    path: &Path,
) -> Result<FileReport> {
    let conversion = tokio::task::spawn_blocking({
        let path = path.to_path_buf();
        let output_dir = settings.output_dir.clone();
        let selector = settings.sheet.clone();
        let codec = settings.codec;
        move || convert_file(&path, &output_dir, &selector, codec)
    })
    .await
    .context("conversion task failed")??;

    let mut report = FileReport {
        source: path.to_path_buf(),
        sheet: conversion.sheet,
        output: None,
        object_key: None,
        rows: conversion.rows,
        columns: conversion.columns,
        bytes: 0,
        outcome: UploadOutcome::SkippedEmpty,
    };
    let Some((output, bytes)) = conversion.parquet else {
        return Ok(report);
    };

    let target = &settings.target;
    let file_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("invalid output path {}", output.display()))?;
    let key = target.object_key(file_name);

    report.outcome = if settings.dry_run {
        info!(object = %target.display(&key), "dry run, not uploading");
        UploadOutcome::DryRun
    } else if settings.skip_existing && store.exists(&target.bucket, &key).await? {
        info!(object = %target.display(&key), "already present, skipping upload");
        UploadOutcome::SkippedExisting
    } else {
        info!("uploading parquet to {}", target.display(&key));
        let sent = store.put_file(&target.bucket, &key, &output).await?;
        info!(bucket = %target.bucket, key = %key, bytes = sent, "uploaded");
        UploadOutcome::Uploaded
    };
    report.output = Some(output);
    report.object_key = Some(key);
    report.bytes = bytes;
    Ok(report)
}

/// Process every matching spreadsheet in the input directory, one at a time.
/// The first failure aborts the run.
pub async fn run(settings: &Settings, store: &dyn ObjectStore) -> Result<RunSummary> {
    let start = Instant::now();
    let files = discover(&settings.input_dir, &settings.extensions)?;
    check_output_names(&files)?;
    info!(
        dir = %settings.input_dir.display(),
        count = files.len(),
        extensions = ?settings.extensions,
        "discovered spreadsheets"
    );

    fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!(
            "creating output directory {}",
            settings.output_dir.display()
        )
    })?;

    let mut summary = RunSummary::default();
    for path in files {
        let report = process_file(settings, store, &path)
            .await
            .with_context(|| format!("processing {}", path.display()))?;
        summary.record(report);
    }

    info!(
        files = summary.files_seen,
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        rows = summary.rows,
        bytes = summary.bytes,
        elapsed = ?start.elapsed(),
        "run complete"
    );
    Ok(summary)
}

pub fn write_report(summary: &RunSummary, path: &Path) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("creating report {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary).context("serializing run summary")?;
    Ok(())
}
