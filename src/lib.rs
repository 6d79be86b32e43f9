//! Whitespace-driven PDF segmentation using lopdf
//!
//! This crate provides:
//! - Per-character position extraction from PDF content streams
//! - Detection of large vertical gaps between consecutive characters
//! - Selection of the largest gaps as cut points
//! - Writing the page of each cut to its own single-page PDF

pub mod cuts;
pub mod extractor;
pub mod gaps;
pub mod writer;

pub use cuts::{select_cuts, Cut};
pub use extractor::{extract_positions, extract_positions_mem, CharPosition, PageRecord};
pub use gaps::{detect_gaps, indexed_page_gaps, page_gaps, Gap, GapMap, DEFAULT_GAP_THRESHOLD};
pub use writer::{write_segments, write_segments_from_doc, OutputOptions, SegmentFile};

use lopdf::Document;
use std::path::{Path, PathBuf};

/// Number of cuts requested when the caller does not say otherwise
pub const DEFAULT_NUM_CUTS: usize = 3;

/// Configuration for a segmentation run
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Minimum vertical gap, in points, that counts as a cut candidate
    pub threshold: f32,
    /// Maximum number of cuts (and therefore output files)
    pub num_cuts: usize,
    /// Where and how output files are named
    pub output: OutputOptions,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_GAP_THRESHOLD,
            num_cuts: DEFAULT_NUM_CUTS,
            output: OutputOptions::default(),
        }
    }
}

/// Gaps and ranked cuts computed for a document, before anything is written
#[derive(Debug, Clone)]
pub struct CutPlan {
    /// Number of pages in the source document
    pub page_count: usize,
    /// Detected gaps, keyed by 0-based page index
    pub gaps: GapMap,
    /// Selected cuts in rank order
    pub cuts: Vec<Cut>,
}

impl CutPlan {
    /// Total number of detected gaps across all pages
    pub fn gap_count(&self) -> usize {
        self.gaps.values().map(Vec::len).sum()
    }
}

/// Result of a full segmentation run
#[derive(Debug)]
pub struct SegmentReport {
    pub plan: CutPlan,
    /// Files written, in rank order
    pub files: Vec<SegmentFile>,
}

/// Compute the cut plan for a PDF file without writing any output
pub fn plan_cuts<P: AsRef<Path>>(
    path: P,
    config: &SegmentConfig,
) -> Result<CutPlan, SegmentError> {
    let pages = extract_positions(path)?;
    plan_from_pages(&pages, config)
}

/// Run gap detection and cut selection over already extracted pages
pub fn plan_from_pages(
    pages: &[PageRecord],
    config: &SegmentConfig,
) -> Result<CutPlan, SegmentError> {
    let gaps = detect_gaps(pages, config.threshold)?;
    let cuts = select_cuts(&gaps, config.num_cuts);

    log::debug!(
        "{} pages, {} gaps over {:.1}pt, {} cuts selected",
        pages.len(),
        gaps.values().map(Vec::len).sum::<usize>(),
        config.threshold,
        cuts.len()
    );

    Ok(CutPlan {
        page_count: pages.len(),
        gaps,
        cuts,
    })
}

/// Segment a PDF file at its largest vertical gaps
///
/// The document is loaded once for extraction and again by the writer.
/// Each load is dropped as soon as its stage finishes.
pub fn segment_pdf<P: AsRef<Path>>(
    path: P,
    config: &SegmentConfig,
) -> Result<SegmentReport, SegmentError> {
    let path = path.as_ref();
    let plan = plan_cuts(path, config)?;
    let files = write_segments(path, &plan.cuts, &config.output)?;

    Ok(SegmentReport { plan, files })
}

/// Segment a PDF held in memory
pub fn segment_pdf_mem(
    buffer: &[u8],
    config: &SegmentConfig,
) -> Result<SegmentReport, SegmentError> {
    let doc = Document::load_mem(buffer)?;
    let pages = extractor::extract_positions_from_doc(&doc)?;
    let plan = plan_from_pages(&pages, config)?;
    let files = write_segments_from_doc(&doc, &plan.cuts, &config.output)?;

    Ok(SegmentReport { plan, files })
}

#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("cannot read document: {0}")]
    DocumentRead(String),
    #[error("malformed position data on page {page}: {reason}")]
    DataShape { page: usize, reason: String },
    #[error("cut references page {page} but the document has {page_count} pages")]
    PageIndex { page: usize, page_count: usize },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SegmentError {
    /// Pipeline stage that produced the error
    pub fn stage(&self) -> &'static str {
        match self {
            SegmentError::DocumentRead(_) => "read",
            SegmentError::DataShape { .. } => "extract",
            SegmentError::PageIndex { .. } | SegmentError::Write { .. } => "write",
            SegmentError::Config(_) => "config",
        }
    }
}

impl From<lopdf::Error> for SegmentError {
    fn from(e: lopdf::Error) -> Self {
        SegmentError::DocumentRead(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: usize, lines: &[(f32, f32)]) -> PageRecord {
        PageRecord {
            index,
            width: 612.0,
            height: 792.0,
            chars: lines
                .iter()
                .map(|&(top, bottom)| CharPosition {
                    text: "x".into(),
                    x0: 72.0,
                    x1: 77.0,
                    top,
                    bottom,
                    size: 10.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_segment_config_default() {
        let config = SegmentConfig::default();
        assert_eq!(config.threshold, 50.0);
        assert_eq!(config.num_cuts, 3);
        assert_eq!(config.output.prefix, "segment");
    }

    #[test]
    fn test_plan_from_pages() {
        let pages = vec![
            page(0, &[(10.0, 20.0), (100.0, 110.0)]),
            page(1, &[(10.0, 20.0), (30.0, 40.0)]),
            page(2, &[(10.0, 20.0), (140.0, 150.0), (210.0, 220.0)]),
        ];
        let config = SegmentConfig {
            num_cuts: 2,
            ..SegmentConfig::default()
        };

        let plan = plan_from_pages(&pages, &config).unwrap();
        assert_eq!(plan.page_count, 3);
        assert_eq!(plan.gap_count(), 3);
        assert!(!plan.gaps.contains_key(&1));
        assert_eq!(
            plan.cuts.iter().map(|c| c.page).collect::<Vec<_>>(),
            vec![2, 0]
        );
    }

    #[test]
    fn test_error_stage() {
        assert_eq!(SegmentError::DocumentRead("x".into()).stage(), "read");
        assert_eq!(
            SegmentError::DataShape {
                page: 0,
                reason: "x".into()
            }
            .stage(),
            "extract"
        );
        assert_eq!(
            SegmentError::PageIndex {
                page: 4,
                page_count: 2
            }
            .stage(),
            "write"
        );
    }

    #[test]
    fn test_page_index_error_message() {
        let err = SegmentError::PageIndex {
            page: 4,
            page_count: 2,
        };
        assert_eq!(
            err.to_string(),
            "cut references page 4 but the document has 2 pages"
        );
    }
}
