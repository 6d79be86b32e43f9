//! Cut selection: rank every detected gap by size and keep the largest

use crate::gaps::{Gap, GapMap};

/// A gap chosen as a cut point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cut {
    /// 0-based page index the gap was found on
    pub page: usize,
    pub gap: Gap,
    /// 0-based position in the descending-size ordering
    pub rank: usize,
}

/// Select up to `num_cuts` of the largest gaps across all pages
///
/// Gaps are flattened page-ascending, then in the order they were found on
/// each page. The sort is stable, so equal sizes keep that order. Asking for
/// more cuts than there are gaps returns every gap.
pub fn select_cuts(gaps: &GapMap, num_cuts: usize) -> Vec<Cut> {
    let mut candidates: Vec<(usize, Gap)> = gaps
        .iter()
        .flat_map(|(&page, page_gaps)| page_gaps.iter().map(move |&gap| (page, gap)))
        .collect();

    candidates.sort_by(|a, b| b.1.size().total_cmp(&a.1.size()));

    candidates
        .into_iter()
        .take(num_cuts)
        .enumerate()
        .map(|(rank, (page, gap))| Cut { page, gap, rank })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gap(start: f32, size: f32) -> Gap {
        Gap {
            start,
            end: start + size,
        }
    }

    fn sample_map() -> GapMap {
        let mut map = GapMap::new();
        map.insert(0, vec![gap(100.0, 80.0)]);
        map.insert(2, vec![gap(50.0, 120.0), gap(300.0, 60.0)]);
        map
    }

    #[test]
    fn test_largest_gaps_first() {
        let cuts = select_cuts(&sample_map(), 2);
        assert_eq!(cuts.len(), 2);
        assert_eq!((cuts[0].page, cuts[0].gap.size(), cuts[0].rank), (2, 120.0, 0));
        assert_eq!((cuts[1].page, cuts[1].gap.size(), cuts[1].rank), (0, 80.0, 1));
    }

    #[test]
    fn test_zero_cuts() {
        assert!(select_cuts(&sample_map(), 0).is_empty());
    }

    #[test]
    fn test_empty_map() {
        assert!(select_cuts(&GapMap::new(), 5).is_empty());
    }

    #[test]
    fn test_more_cuts_than_gaps() {
        let cuts = select_cuts(&sample_map(), 10);
        assert_eq!(cuts.len(), 3);
        assert_eq!(
            cuts.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_ties_keep_page_then_gap_order() {
        let mut map = GapMap::new();
        map.insert(3, vec![gap(10.0, 70.0)]);
        map.insert(1, vec![gap(40.0, 70.0), gap(200.0, 70.0)]);
        map.insert(2, vec![gap(5.0, 90.0)]);

        let cuts = select_cuts(&map, 4);
        let order: Vec<(usize, f32)> = cuts.iter().map(|c| (c.page, c.gap.start)).collect();
        assert_eq!(order, vec![(2, 5.0), (1, 40.0), (1, 200.0), (3, 10.0)]);

        // Same input, same answer
        assert_eq!(select_cuts(&map, 4), cuts);
    }
}
