//! CLI tool for splitting a PDF at its largest vertical gaps

use clap::Parser;
use pdf_gapcut::{
    plan_cuts, segment_pdf, CutPlan, OutputOptions, SegmentConfig, DEFAULT_GAP_THRESHOLD,
    DEFAULT_NUM_CUTS,
};
use std::path::PathBuf;
use std::process;

/// Write the page of each of the N largest whitespace gaps to its own PDF.
#[derive(Debug, Parser)]
#[command(name = "pdf-gapcut", about, version)]
struct Cli {
    /// Path to the PDF file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Number of cuts (output files) to produce
    #[arg(value_name = "NUM_CUTS", default_value_t = DEFAULT_NUM_CUTS)]
    num_cuts: usize,

    /// Minimum vertical gap in points
    #[arg(long, default_value_t = DEFAULT_GAP_THRESHOLD)]
    threshold: f32,

    /// Directory for the output files
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix for the output files
    #[arg(long, default_value = "segment")]
    prefix: String,

    /// Print the ranked cuts without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides it
    #[arg(long, default_value = "warn")]
    log_level: log::LevelFilter,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = SegmentConfig {
        threshold: cli.threshold,
        num_cuts: cli.num_cuts,
        output: OutputOptions {
            dir: cli.output_dir.clone(),
            prefix: cli.prefix.clone(),
        },
    };

    if cli.dry_run {
        match plan_cuts(&cli.file, &config) {
            Ok(plan) => print_plan(&plan, &config),
            Err(e) => {
                eprintln!("Error: {}: {}", e.stage(), e);
                process::exit(1);
            }
        }
        return;
    }

    match segment_pdf(&cli.file, &config) {
        Ok(report) => {
            for file in &report.files {
                println!("Saved: {}", file.path.display());
            }
            if report.files.len() < config.num_cuts {
                eprintln!(
                    "Found {} gaps over {:.1}pt; wrote {} of {} requested segments",
                    report.plan.gap_count(),
                    config.threshold,
                    report.files.len(),
                    config.num_cuts
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}: {}", e.stage(), e);
            process::exit(1);
        }
    }
}

fn print_plan(plan: &CutPlan, config: &SegmentConfig) {
    println!(
        "{} pages, {} gaps over {:.1}pt, {} cuts",
        plan.page_count,
        plan.gap_count(),
        config.threshold,
        plan.cuts.len()
    );
    if plan.cuts.is_empty() {
        return;
    }
    println!(
        "{:>5} {:>6} {:>8} {:>8} {:>8}  {}",
        "Rank", "Page", "Start", "End", "Size", "Output"
    );
    for cut in &plan.cuts {
        println!(
            "{:>5} {:>6} {:8.1} {:8.1} {:8.1}  {}",
            cut.rank + 1,
            cut.page + 1,
            cut.gap.start,
            cut.gap.end,
            cut.gap.size(),
            config.output.path_for(cut.rank).display()
        );
    }
}
