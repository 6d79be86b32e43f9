//! Vertical gap detection
//!
//! Gaps are measured along the character stream as the parser emits it:
//! the distance from one character's bottom edge to the next character's
//! top edge. Geometric neighbours that are not consecutive in the stream
//! are never compared.

use crate::extractor::PageRecord;
use crate::SegmentError;
use std::collections::BTreeMap;

/// Default minimum gap size in points
pub const DEFAULT_GAP_THRESHOLD: f32 = 50.0;

/// A vertical whitespace interval on one page (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gap {
    /// Bottom edge of the character before the gap
    pub start: f32,
    /// Top edge of the character after the gap
    pub end: f32,
}

impl Gap {
    pub fn size(&self) -> f32 {
        self.end - self.start
    }
}

/// Gaps per 0-based page index. Pages without gaps have no entry.
pub type GapMap = BTreeMap<usize, Vec<Gap>>;

/// Detect gaps larger than `threshold` on every page
pub fn detect_gaps(pages: &[PageRecord], threshold: f32) -> Result<GapMap, SegmentError> {
    check_threshold(threshold)?;

    let mut gaps = GapMap::new();

    for page in pages {
        let page_gaps = page_gaps(page, threshold)?;
        log::debug!(
            "page {}: {} chars, {} gaps over {:.1}pt",
            page.index,
            page.chars.len(),
            page_gaps.len(),
            threshold
        );
        if !page_gaps.is_empty() {
            gaps.insert(page.index, page_gaps);
        }
    }

    Ok(gaps)
}

/// Scan one page's characters in stream order and collect qualifying gaps
pub fn page_gaps(page: &PageRecord, threshold: f32) -> Result<Vec<Gap>, SegmentError> {
    Ok(indexed_page_gaps(page, threshold)?
        .into_iter()
        .map(|(_, gap)| gap)
        .collect())
}

/// Like [`page_gaps`], paired with the index in `page.chars` of the
/// character that ends each gap
pub fn indexed_page_gaps(
    page: &PageRecord,
    threshold: f32,
) -> Result<Vec<(usize, Gap)>, SegmentError> {
    check_threshold(threshold)?;

    let (_, gaps) = page.chars.iter().enumerate().try_fold(
        (None::<f32>, Vec::new()),
        |(prev_bottom, mut gaps), (i, ch)| {
            if !ch.top.is_finite() || !ch.bottom.is_finite() {
                return Err(SegmentError::DataShape {
                    page: page.index,
                    reason: format!(
                        "character {} has non-finite bounds (top {}, bottom {})",
                        i, ch.top, ch.bottom
                    ),
                });
            }

            if let Some(prev) = prev_bottom {
                if ch.top - prev > threshold {
                    gaps.push((
                        i,
                        Gap {
                            start: prev,
                            end: ch.top,
                        },
                    ));
                }
            }

            Ok((Some(ch.bottom), gaps))
        },
    )?;

    Ok(gaps)
}

/// A negative or non-finite threshold would admit gaps with `end <= start`
fn check_threshold(threshold: f32) -> Result<(), SegmentError> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(SegmentError::Config(format!(
            "gap threshold must be a non-negative number, got {}",
            threshold
        )));
    }
    Ok(())
}
