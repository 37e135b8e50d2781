use arrow::util::pretty::pretty_format_batches;
use sheetlake::inspect::{inspect, read_batches};
use std::{env, path::Path, process::exit};

const PREVIEW_ROWS: usize = 10;

fn main() {
    // Expect exactly one CLI argument: path to a converted Parquet file.
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <PARQUET_FILE>", args[0]);
        exit(1);
    }
    if let Err(e) = print_file(Path::new(&args[1])) {
        eprintln!("Error: {:#}", e);
        exit(1);
    }
}

fn print_file(path: &Path) -> anyhow::Result<()> {
    let summary = inspect(path)?;

    println!("=== Parquet File: {} ===", path.display());
    println!("Total rows:           {}", summary.rows);
    println!("Number of row groups: {}", summary.row_groups);
    println!("File-size on disk:    {} bytes", summary.size_bytes);
    for key in ["sheetlake.source", "sheetlake.sheet"] {
        if let Some(value) = summary.metadata.get(key) {
            println!("{:<22}{}", format!("{}:", key), value);
        }
    }
    println!();

    println!("=== Columns ===");
    for (name, ty) in &summary.columns {
        println!("- {:<30} | {}", name, ty);
    }
    println!();

    println!("=== First {} rows ===", PREVIEW_ROWS);
    let mut remaining = PREVIEW_ROWS;
    let mut preview = Vec::new();
    for batch in read_batches(path)? {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.num_rows());
        preview.push(batch.slice(0, take));
        remaining -= take;
    }
    println!("{}", pretty_format_batches(&preview)?);
    Ok(())
}
