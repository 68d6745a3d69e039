// ============================================================
// Layer 4 — Caption Annotation Loader
// ============================================================
// Reads a COCO-style caption annotation file:
//
//   {
//     "images":      [ { "id": 42, "file_name": "000042.jpg" }, ... ],
//     "annotations": [ { "image_id": 42, "caption": "A dog ..." }, ... ]
//   }
//
// and joins the two lists into one ImageMetadata per image.
// Images without captions are dropped; captions that point at
// an unknown image id are ignored with a warning.
//
// Reference: Lin et al. (2014) Microsoft COCO
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::{fs, path::{Path, PathBuf}};

use crate::domain::image_metadata::ImageMetadata;
use crate::domain::traits::CaptionSource;

#[derive(Debug, Deserialize)]
struct AnnotationFile {
    images:      Vec<ImageEntry>,
    annotations: Vec<AnnotationEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    id:        u64,
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationEntry {
    image_id: u64,
    caption:  String,
}

/// Loads image/caption metadata from a COCO annotation file.
/// Implements the CaptionSource trait from Layer 3.
pub struct CocoCaptionLoader {
    captions_file: PathBuf,
    image_dir:     PathBuf,
}

impl CocoCaptionLoader {
    pub fn new(captions_file: impl AsRef<Path>, image_dir: impl AsRef<Path>) -> Self {
        Self {
            captions_file: captions_file.as_ref().to_path_buf(),
            image_dir:     image_dir.as_ref().to_path_buf(),
        }
    }

    /// Absolute path of an image listed in the annotations
    pub fn image_path(&self, meta: &ImageMetadata) -> PathBuf {
        self.image_dir.join(&meta.filename)
    }
}

impl CaptionSource for CocoCaptionLoader {
    fn load_all(&self) -> Result<Vec<ImageMetadata>> {
        let json = fs::read_to_string(&self.captions_file).with_context(|| {
            format!("Cannot read captions file '{}'", self.captions_file.display())
        })?;
        let parsed: AnnotationFile = serde_json::from_str(&json).with_context(|| {
            format!("Cannot parse captions file '{}'", self.captions_file.display())
        })?;

        let metadata = join_annotations(parsed);
        let num_captions: usize = metadata.iter().map(|m| m.captions.len()).sum();
        tracing::info!(
            "Loaded {} images with {} captions from '{}'",
            metadata.len(),
            num_captions,
            self.captions_file.display()
        );
        Ok(metadata)
    }
}

fn join_annotations(parsed: AnnotationFile) -> Vec<ImageMetadata> {
    let mut by_id: HashMap<u64, Vec<String>> = HashMap::with_capacity(parsed.images.len());
    for img in &parsed.images {
        by_id.entry(img.id).or_default();
    }

    for ann in parsed.annotations {
        match by_id.get_mut(&ann.image_id) {
            Some(caps) => caps.push(ann.caption),
            None => tracing::warn!("Caption references unknown image id {}", ann.image_id),
        }
    }

    // Keep the image order of the annotation file
    parsed
        .images
        .into_iter()
        .filter_map(|img| {
            let captions = by_id.remove(&img.id)?;
            if captions.is_empty() {
                return None;
            }
            Some(ImageMetadata::new(img.id, img.file_name, captions))
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "images": [
            {"id": 1, "file_name": "one.jpg"},
            {"id": 2, "file_name": "two.jpg"},
            {"id": 3, "file_name": "three.jpg"}
        ],
        "annotations": [
            {"image_id": 1, "caption": "A dog."},
            {"image_id": 2, "caption": "A cat."},
            {"image_id": 1, "caption": "A brown dog."},
            {"image_id": 9, "caption": "Orphan."}
        ]
    }"#;

    #[test]
    fn test_groups_captions_by_image() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();

        let loader = CocoCaptionLoader::new(f.path(), "/images");
        let images = loader.load_all().unwrap();

        // Image 3 has no captions and is dropped
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].filename, "one.jpg");
        assert_eq!(images[0].captions, vec!["A dog.", "A brown dog."]);
        assert_eq!(loader.image_path(&images[1]), PathBuf::from("/images/two.jpg"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = CocoCaptionLoader::new("/nonexistent/captions.json", "/images");
        assert!(loader.load_all().is_err());
    }
}
