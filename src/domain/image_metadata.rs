// ============================================================
// Layer 3 — ImageMetadata Domain Type
// ============================================================
// One image from an annotation file together with every
// human-written caption that describes it. The captions are the
// raw sentences; tokenisation happens later in the data layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Identifier from the annotation file
    pub image_id: u64,

    /// Path to the image, relative to the image directory
    pub filename: String,

    /// Raw caption sentences
    pub captions: Vec<String>,
}

impl ImageMetadata {
    pub fn new(image_id: u64, filename: impl Into<String>, captions: Vec<String>) -> Self {
        Self {
            image_id,
            filename: filename.into(),
            captions,
        }
    }

    /// Break this image into one entry per caption. Training treats
    /// every image/caption pair as an independent example.
    pub fn split_captions(self) -> Vec<ImageMetadata> {
        let Self { image_id, filename, captions } = self;
        captions
            .into_iter()
            .map(|c| ImageMetadata::new(image_id, filename.clone(), vec![c]))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_captions_one_entry_each() {
        let m = ImageMetadata::new(7, "x.jpg", vec!["a".into(), "b".into()]);
        let parts = m.split_captions();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.image_id == 7 && p.captions.len() == 1));
        assert_eq!(parts[1].captions[0], "b");
    }
}
