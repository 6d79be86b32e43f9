//! Debug tool: Print the vertical gaps the detector finds on each page
//!
//! Usage: debug_gaps <pdf_file> [--page N] [--threshold PT]
//!
//! For every page, lists each gap between consecutive characters that exceeds
//! the threshold, with the text that follows it, followed by summary
//! statistics and a histogram of gap sizes.

use clap::Parser;
use pdf_gapcut::{extract_positions, indexed_page_gaps, DEFAULT_GAP_THRESHOLD};
use std::path::PathBuf;
use std::process;

#[derive(Debug, Parser)]
#[command(name = "debug_gaps", about = "Print vertical gaps between consecutive characters")]
struct Args {
    /// Path to the PDF file
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Only show this page (1-based)
    #[arg(long)]
    page: Option<usize>,

    /// Minimum vertical gap in points
    #[arg(long, default_value_t = DEFAULT_GAP_THRESHOLD)]
    threshold: f32,
}

fn main() {
    let args = Args::parse();
    env_logger::init();

    let pages = match extract_positions(&args.file) {
        Ok(pages) => pages,
        Err(e) => {
            eprintln!("Error extracting positions: {}", e);
            process::exit(1);
        }
    };

    eprintln!("Gap threshold: {:.1}pt", args.threshold);
    eprintln!();

    for page in &pages {
        if args.page.is_some_and(|p| p != page.index + 1) {
            continue;
        }

        let gaps = match indexed_page_gaps(page, args.threshold) {
            Ok(gaps) => gaps,
            Err(e) => {
                eprintln!("Error on page {}: {}", page.index + 1, e);
                process::exit(1);
            }
        };

        println!(
            "===== PAGE {} ({} chars, {:.0}x{:.0}pt) =====",
            page.index + 1,
            page.chars.len(),
            page.width,
            page.height
        );

        if gaps.is_empty() {
            println!("  no gaps over {:.1}pt", args.threshold);
            println!();
            continue;
        }

        println!("{:>8} {:>8} {:>8}  {}", "Start", "End", "Size", "Next text");
        println!("{}", "-".repeat(60));

        for (next, gap) in &gaps {
            // Text that follows the gap, up to 40 chars
            let next_text: String = page.chars[*next..]
                .iter()
                .take(40)
                .map(|c| c.text.as_str())
                .collect();
            println!(
                "{:8.1} {:8.1} {:8.1}  {}",
                gap.start,
                gap.end,
                gap.size(),
                next_text
            );
        }
        println!();

        let mut sizes: Vec<f32> = gaps.iter().map(|(_, g)| g.size()).collect();
        sizes.sort_by(|a, b| a.total_cmp(b));
        let min = sizes[0];
        let max = sizes[sizes.len() - 1];
        let median = sizes[sizes.len() / 2];
        let mean: f32 = sizes.iter().sum::<f32>() / sizes.len() as f32;

        println!("  Gap statistics for page {}:", page.index + 1);
        println!("    Count:  {}", sizes.len());
        println!("    Min:    {:6.1}", min);
        println!("    Max:    {:6.1}", max);
        println!("    Median: {:6.1}", median);
        println!("    Mean:   {:6.1}", mean);

        // Histogram in multiples of the threshold
        println!();
        println!("  Gap size histogram (size / threshold):");
        let buckets = [0.0f32, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, f32::INFINITY];
        let unit = args.threshold.max(1.0);
        for window in buckets.windows(2) {
            let count = sizes
                .iter()
                .filter(|&&s| {
                    let r = s / unit;
                    r >= window[0] && r < window[1]
                })
                .count();
            if count > 0 {
                let label = if window[1] == f32::INFINITY {
                    format!("{:4.1}+    ", window[0])
                } else {
                    format!("{:4.1}-{:<4.1}", window[0], window[1])
                };
                println!("    {} | {:3} {}", label, count, "#".repeat(count.min(60)));
            }
        }
        println!();
    }
}
