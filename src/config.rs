use crate::{sheet::SheetSelector, upload::LakeTarget, write::Codec};
use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use url::Url;

pub const DEFAULT_BUCKET: &str = "drones03";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_PREFIX: &str = "drone-registrations";
pub const DEFAULT_EXTENSION: &str = "xlsx";

/// Convert a directory of spreadsheets to Parquet and upload them to a lakeFS/S3 bucket.
///
/// Credentials are read from the standard AWS environment variables or profile.
#[derive(Parser, Debug, Default)]
#[command(name = "sheetlake", version)]
pub struct Args {
    /// YAML file with defaults for any of the options below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory scanned for spreadsheets
    #[arg(long, env = "SHEETLAKE_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Where Parquet files are written (defaults to the input directory)
    #[arg(long, env = "SHEETLAKE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Bucket, or lakeFS repository
    #[arg(long, env = "SHEETLAKE_BUCKET")]
    pub bucket: Option<String>,

    /// Branch, the first segment of every object key
    #[arg(long, env = "SHEETLAKE_BRANCH")]
    pub branch: Option<String>,

    /// Key prefix inside the branch
    #[arg(long, env = "SHEETLAKE_PREFIX")]
    pub prefix: Option<String>,

    /// S3 endpoint, e.g. https://example.lakefscloud.io/
    #[arg(long, env = "SHEETLAKE_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "SHEETLAKE_REGION")]
    pub region: Option<String>,

    /// Worksheet to convert: a name or a zero-based index (default: first)
    #[arg(long)]
    pub sheet: Option<SheetSelector>,

    /// File extension to pick up; repeat for several (default: xlsx)
    #[arg(long = "ext")]
    pub extensions: Vec<String>,

    #[arg(long, value_enum)]
    pub compression: Option<Codec>,

    /// Skip files whose object already exists remotely
    #[arg(long)]
    pub skip_existing: bool,

    /// Convert only; do not upload
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON run summary to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// On-disk configuration. Every field is optional; CLI flags win.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub bucket: Option<String>,
    pub branch: Option<String>,
    pub prefix: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub sheet: Option<String>,
    pub extensions: Option<Vec<String>>,
    pub compression: Option<Codec>,
    pub skip_existing: Option<bool>,
    pub dry_run: Option<bool>,
    pub report: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub target: LakeTarget,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub sheet: SheetSelector,
    /// Lower-case, without the leading dot
    pub extensions: Vec<String>,
    pub codec: Codec,
    pub skip_existing: bool,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
}

impl Settings {
    /// Load the optional YAML file named by `--config`, merge, and validate.
    pub fn resolve(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let settings = Self::merge(args, file);
        settings.validate()?;
        Ok(settings)
    }

    /// CLI/env over file over built-in defaults.
    pub fn merge(args: Args, file: FileConfig) -> Self {
        let input_dir = args
            .input_dir
            .or(file.input_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let output_dir = args
            .output_dir
            .or(file.output_dir)
            .unwrap_or_else(|| input_dir.clone());

        let extensions = if !args.extensions.is_empty() {
            args.extensions
        } else {
            file.extensions
                .unwrap_or_else(|| vec![DEFAULT_EXTENSION.to_string()])
        };
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .collect();

        let sheet = args
            .sheet
            .or_else(|| file.sheet.and_then(|s| s.parse().ok()))
            .unwrap_or_default();

        Settings {
            input_dir,
            output_dir,
            target: LakeTarget {
                bucket: args
                    .bucket
                    .or(file.bucket)
                    .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
                branch: args
                    .branch
                    .or(file.branch)
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                prefix: args
                    .prefix
                    .or(file.prefix)
                    .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            },
            endpoint: args.endpoint.or(file.endpoint),
            region: args.region.or(file.region),
            sheet,
            extensions,
            codec: args.compression.or(file.compression).unwrap_or_default(),
            skip_existing: args.skip_existing || file.skip_existing.unwrap_or(false),
            dry_run: args.dry_run || file.dry_run.unwrap_or(false),
            report: args.report.or(file.report),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bucket = &self.target.bucket;
        if bucket.trim().is_empty() || bucket.contains('/') {
            bail!("invalid bucket {:?}", bucket);
        }
        if self.target.branch.trim_matches('/').is_empty() {
            bail!("branch must not be empty");
        }
        if let Some(endpoint) = &self.endpoint {
            let url = Url::parse(endpoint)
                .with_context(|| format!("invalid endpoint URL {:?}", endpoint))?;
            if !matches!(url.scheme(), "http" | "https") {
                bail!("endpoint {:?} must be an http(s) URL", endpoint);
            }
        }
        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.is_empty()) {
            bail!("at least one non-empty file extension is required");
        }
        if !self.input_dir.is_dir() {
            bail!(
                "input directory {} does not exist or is not a directory",
                self.input_dir.display()
            );
        }
        Ok(())
    }
}
