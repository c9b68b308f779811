use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::GodToolError;

/// Page attributes a page may inherit from its ancestors in the page tree.
/// They are copied onto each page because the source page trees are dropped.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Merge every PDF in `dir`, in file name order, into `dir/output_name`.
/// Returns the number of input files merged; an empty directory is a no-op.
pub fn merge_pdfs(dir: &Path, output_name: &str) -> Result<usize, GodToolError> {
    let output_path = dir.join(output_name);
    let inputs = pdf_files(dir, &output_path)?;

    if inputs.is_empty() {
        info!("No PDF files found in {}", dir.display());
        return Ok(0);
    }

    let mut merged = Document::with_version("1.5");
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut max_id = 1;

    for input in &inputs {
        info!("Adding {} ...", input.display());
        let mut doc = Document::load(input)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in &pages {
            let inherited = inherited_attributes(&doc, *page_id);
            if let Ok(page) = doc.get_object_mut(*page_id).and_then(Object::as_dict_mut) {
                for (key, value) in inherited {
                    page.set(key, value);
                }
            }
        }
        page_ids.extend(pages);

        for (id, object) in doc.objects {
            if !is_document_structure(&object) {
                merged.objects.insert(id, object);
            }
        }
    }

    let pages_id: ObjectId = (max_id, 0);
    let catalog_id: ObjectId = (max_id + 1, 0);

    for page_id in &page_ids {
        if let Ok(page) = merged.get_object_mut(*page_id).and_then(Object::as_dict_mut) {
            page.set("Parent", pages_id);
        }
    }

    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(page_ids.len() as i64),
    };
    merged.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    merged.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged.trailer.set("Root", catalog_id);
    merged.max_id = catalog_id.0;

    merged.renumber_objects();
    merged.compress();
    merged.save(&output_path)?;

    info!(
        "Successfully merged {} PDFs into {}",
        inputs.len(),
        output_path.display()
    );

    Ok(inputs.len())
}

fn pdf_files(dir: &Path, output_path: &Path) -> Result<Vec<PathBuf>, GodToolError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() && path != output_path {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Catalogs, page tree nodes and outlines are rebuilt for the merged document
fn is_document_structure(object: &Object) -> bool {
    let type_name = object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|t| t.as_name().ok());

    matches!(
        type_name,
        Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines") | Some(b"Outline")
    )
}

/// Attributes the page doesn't set itself but inherits from an ancestor
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut found: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut parent = parent_of(page);
    // Bounded walk in case of a cyclic page tree
    for _ in 0..64 {
        let Some(node) = parent.and_then(|id| doc.get_dictionary(id).ok()) else {
            break;
        };
        for key in INHERITABLE {
            let already = page.has(key) || found.iter().any(|(k, _)| k.as_slice() == key);
            if !already {
                if let Ok(value) = node.get(key) {
                    found.push((key.to_vec(), value.clone()));
                }
            }
        }
        parent = parent_of(node);
    }

    found
}

fn parent_of(dict: &Dictionary) -> Option<ObjectId> {
    dict.get(b"Parent").and_then(Object::as_reference).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Write a minimal PDF with `pages` blank pages whose MediaBox lives on
    /// the page tree node, so the pages have to inherit it
    fn write_pdf(path: &Path, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                });
                Object::Reference(page_id)
            })
            .collect();
        let media_box = vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Integer(842),
        ];
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(pages as i64),
                "MediaBox" => media_box,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_merges_all_pdfs_into_output() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("b.pdf"), 2);
        write_pdf(&dir.path().join("a.pdf"), 1);
        fs::write(dir.path().join("notes.txt"), b"not a pdf").unwrap();

        let merged_count = merge_pdfs(dir.path(), "merged.pdf").unwrap();
        assert_eq!(merged_count, 2);

        let merged = Document::load(dir.path().join("merged.pdf")).unwrap();
        let pages = merged.get_pages();
        assert_eq!(pages.len(), 3);

        for page_id in pages.values() {
            let page = merged.get_dictionary(*page_id).unwrap();
            assert!(page.has(b"MediaBox"), "inherited MediaBox should be copied");
        }
    }

    #[test]
    fn test_existing_output_is_not_an_input() {
        let dir = TempDir::new().unwrap();
        write_pdf(&dir.path().join("a.pdf"), 1);
        write_pdf(&dir.path().join("merged.pdf"), 5);

        assert_eq!(merge_pdfs(dir.path(), "merged.pdf").unwrap(), 1);

        let merged = Document::load(dir.path().join("merged.pdf")).unwrap();
        assert_eq!(merged.get_pages().len(), 1);
    }

    #[test]
    fn test_no_pdfs_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        assert_eq!(merge_pdfs(dir.path(), "merged.pdf").unwrap(), 0);
        assert!(!dir.path().join("merged.pdf").exists());
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.pdf"), b"%PDF-1.5 nonsense").unwrap();
        assert!(merge_pdfs(dir.path(), "merged.pdf").is_err());
    }
}
