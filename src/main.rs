use anyhow::Result;
use clap::Parser;
use sheetlake::{
    config::{Args, Settings},
    pipeline,
    upload::S3Store,
};
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    });
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    info!("startup");

    // ─── 2) resolve configuration ────────────────────────────────────
    let settings = Settings::resolve(Args::parse())?;
    info!(
        input = %settings.input_dir.display(),
        output = %settings.output_dir.display(),
        bucket = %settings.target.bucket,
        branch = %settings.target.branch,
        prefix = %settings.target.prefix,
        endpoint = ?settings.endpoint,
        sheet = %settings.sheet,
        dry_run = settings.dry_run,
        "configuration"
    );

    // ─── 3) object store client ──────────────────────────────────────
    let store = S3Store::connect(settings.endpoint.as_deref(), settings.region.as_deref()).await?;

    // ─── 4) convert + upload, one file at a time ─────────────────────
    let summary = pipeline::run(&settings, &store).await?;

    if let Some(path) = &settings.report {
        pipeline::write_report(&summary, path)?;
        info!(report = %path.display(), "wrote run report");
    }

    info!(
        converted = summary.converted,
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        "all done"
    );
    Ok(())
}
