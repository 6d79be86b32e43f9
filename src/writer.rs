//! Segment output: one single-page PDF per cut
//!
//! Every cut is validated against the document before the first file is
//! created. If a write fails, files already written by the same call are
//! removed so a failed run leaves no partial output behind.

use crate::cuts::Cut;
use crate::SegmentError;
use lopdf::Document;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Where segments are written and how they are named
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Output directory, created if missing
    pub dir: PathBuf,
    /// File name stem; files are named `<prefix>_<n>.pdf` with `n` 1-based
    pub prefix: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: "segment".to_string(),
        }
    }
}

impl OutputOptions {
    pub fn file_name(&self, rank: usize) -> String {
        format!("{}_{}.pdf", self.prefix, rank + 1)
    }

    pub fn path_for(&self, rank: usize) -> PathBuf {
        self.dir.join(self.file_name(rank))
    }
}

/// A segment file that was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    pub rank: usize,
    /// Source page (0-based) copied into the file
    pub page: usize,
    pub path: PathBuf,
}

/// Load `source` and write one file per cut
pub fn write_segments<P: AsRef<Path>>(
    source: P,
    cuts: &[Cut],
    options: &OutputOptions,
) -> Result<Vec<SegmentFile>, SegmentError> {
    if cuts.is_empty() {
        return Ok(Vec::new());
    }
    let doc = Document::load(source)?;
    write_segments_from_doc(&doc, cuts, options)
}

/// Write one file per cut from an already loaded document
pub fn write_segments_from_doc(
    doc: &Document,
    cuts: &[Cut],
    options: &OutputOptions,
) -> Result<Vec<SegmentFile>, SegmentError> {
    let page_count = doc.get_pages().len();
    if let Some(cut) = cuts.iter().find(|cut| cut.page >= page_count) {
        return Err(SegmentError::PageIndex {
            page: cut.page,
            page_count,
        });
    }
    if cuts.is_empty() {
        return Ok(Vec::new());
    }

    fs::create_dir_all(&options.dir).map_err(|source| SegmentError::Write {
        path: options.dir.clone(),
        source,
    })?;

    let mut written: Vec<SegmentFile> = Vec::with_capacity(cuts.len());

    for cut in cuts {
        let path = options.path_for(cut.rank);
        let result =
            single_page_document(doc, cut.page).and_then(|mut page_doc| save(&mut page_doc, &path));

        if let Err(e) = result {
            // The failed file may exist half-written
            let _ = fs::remove_file(&path);
            remove_written(&written);
            return Err(e);
        }

        log::info!("Saved: {} (page {})", path.display(), cut.page + 1);
        written.push(SegmentFile {
            rank: cut.rank,
            page: cut.page,
            path,
        });
    }

    Ok(written)
}

/// Copy of `doc` that keeps only the page at `page` (0-based)
pub fn single_page_document(doc: &Document, page: usize) -> Result<Document, SegmentError> {
    let page_count = doc.get_pages().len();
    if page >= page_count {
        return Err(SegmentError::PageIndex { page, page_count });
    }

    let keep = page as u32 + 1;
    let others: Vec<u32> = (1..=page_count as u32).filter(|&n| n != keep).collect();

    let mut out = doc.clone();
    out.delete_pages(&others);
    out.prune_objects();
    Ok(out)
}

fn save(doc: &mut Document, path: &Path) -> Result<(), SegmentError> {
    let write_err = |source: io::Error| SegmentError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut out = BufWriter::new(file);
    doc.save_to(&mut out)
        .map_err(|e| write_err(io::Error::other(e.to_string())))?;
    out.flush().map_err(write_err)?;
    Ok(())
}

fn remove_written(written: &[SegmentFile]) {
    for segment in written {
        match fs::remove_file(&segment.path) {
            Ok(()) => log::warn!("Removed {} after failed run", segment.path.display()),
            Err(e) => log::warn!("Could not remove {}: {}", segment.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaps::Gap;
    use lopdf::{dictionary, Object, Stream};

    fn three_page_doc() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for label in ["one", "two", "three"] {
            let content = format!("BT 72 700 Td ({}) Tj ET", label);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.set_object(
            pages_id,
            dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 3,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
            },
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn cut(page: usize, rank: usize) -> Cut {
        Cut {
            page,
            gap: Gap {
                start: 10.0,
                end: 100.0,
            },
            rank,
        }
    }

    fn page_text(doc: &Document) -> String {
        let page_id = *doc.get_pages().values().next().unwrap();
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string()
    }

    #[test]
    fn test_file_naming() {
        let options = OutputOptions {
            dir: PathBuf::from("out"),
            prefix: "part".into(),
        };
        assert_eq!(options.file_name(0), "part_1.pdf");
        assert_eq!(options.path_for(2), PathBuf::from("out").join("part_3.pdf"));
    }

    #[test]
    fn test_single_page_document_keeps_requested_page() {
        let doc = three_page_doc();
        let page = single_page_document(&doc, 1).unwrap();
        assert_eq!(page.get_pages().len(), 1);
        assert!(page_text(&page).contains("(two)"));
        // Source is untouched
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_out_of_range_page_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            dir: dir.path().to_path_buf(),
            ..OutputOptions::default()
        };
        let doc = three_page_doc();

        let result = write_segments_from_doc(&doc, &[cut(0, 0), cut(3, 1)], &options);
        match result {
            Err(SegmentError::PageIndex { page, page_count }) => {
                assert_eq!((page, page_count), (3, 3));
            }
            other => panic!("expected PageIndex error, got {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_writes_one_file_per_cut_in_rank_order() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            dir: dir.path().join("nested"),
            ..OutputOptions::default()
        };
        let doc = three_page_doc();

        let files = write_segments_from_doc(&doc, &[cut(2, 0), cut(0, 1)], &options).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, options.path_for(0));
        assert_eq!(files[0].page, 2);

        let first = Document::load(&files[0].path).unwrap();
        assert_eq!(first.get_pages().len(), 1);
        assert!(page_text(&first).contains("(three)"));

        let second = Document::load(&files[1].path).unwrap();
        assert!(page_text(&second).contains("(one)"));
    }

    #[test]
    fn test_unwritable_directory_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("taken");
        fs::write(&blocker, b"not a directory").unwrap();
        let options = OutputOptions {
            dir: blocker.clone(),
            ..OutputOptions::default()
        };

        match write_segments_from_doc(&three_page_doc(), &[cut(0, 0)], &options) {
            Err(SegmentError::Write { path, .. }) => assert_eq!(path, blocker),
            other => panic!("expected Write error, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_write_removes_earlier_segments() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            dir: dir.path().to_path_buf(),
            ..OutputOptions::default()
        };
        // A directory where the second segment should go
        let taken = options.path_for(1);
        fs::create_dir(&taken).unwrap();

        match write_segments_from_doc(&three_page_doc(), &[cut(2, 0), cut(0, 1)], &options) {
            Err(SegmentError::Write { path, .. }) => assert_eq!(path, taken),
            other => panic!("expected Write error, got {:?}", other),
        }
        assert!(!options.path_for(0).exists());
        assert!(taken.is_dir());
    }

    #[test]
    fn test_no_cuts_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            dir: dir.path().join("never"),
            ..OutputOptions::default()
        };
        let files = write_segments_from_doc(&three_page_doc(), &[], &options).unwrap();
        assert!(files.is_empty());
        assert!(!options.dir.exists());
    }
}
