//! Known-identity gallery, loaded once at startup and read-only afterwards.

use crate::embedder::{EmbedderError, FaceEmbedder};
use crate::types::{Embedding, UNKNOWN_IDENTITY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("failed to read gallery manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid gallery manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("reference image not found: {0}")]
    ImageNotFound(PathBuf),
    #[error("failed to decode reference image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("no face found in reference image {path} for {identity}")]
    NoFaceInReference { identity: String, path: PathBuf },
    #[error("embedding failed for reference image {path}: {source}")]
    Embedder {
        path: PathBuf,
        source: EmbedderError,
    },
    #[error("embedding for {identity} has dimension {actual}, gallery uses {expected}")]
    DimensionMismatch {
        identity: String,
        expected: usize,
        actual: usize,
    },
    #[error("identity name {0:?} is reserved for unmatched faces")]
    ReservedIdentity(String),
}

fn check_identity(identity: &str) -> Result<(), GalleryError> {
    if identity == UNKNOWN_IDENTITY {
        return Err(GalleryError::ReservedIdentity(identity.to_string()));
    }
    Ok(())
}

/// One known identity and a reference embedding for it.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity: String,
    pub embedding: Embedding,
}

/// A reference image to enroll into the gallery at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GallerySource {
    pub identity: String,
    pub image: PathBuf,
}

/// Ordered set of gallery entries sharing a single embedding dimension.
///
/// Insertion order is preserved and is the matcher's tie-break order.
/// An identity may appear more than once (several reference embeddings).
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a gallery from precomputed entries, enforcing a constant dimension.
    pub fn from_entries(entries: Vec<GalleryEntry>) -> Result<Self, GalleryError> {
        for entry in &entries {
            check_identity(&entry.identity)?;
        }
        if let Some(first) = entries.first() {
            let expected = first.embedding.dimension();
            for entry in &entries {
                let actual = entry.embedding.dimension();
                if actual != expected {
                    return Err(GalleryError::DimensionMismatch {
                        identity: entry.identity.clone(),
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// Enroll every source through the embedder.
    ///
    /// Fails on the first unreadable or faceless reference image; a partial
    /// gallery is never returned, and a source named `"Unknown"` is rejected
    /// before any image is read. When a reference image holds several faces
    /// the first one reported by the embedder is used.
    pub fn load(
        sources: &[GallerySource],
        embedder: &mut dyn FaceEmbedder,
    ) -> Result<Self, GalleryError> {
        let mut entries = Vec::with_capacity(sources.len());

        for source in sources {
            check_identity(&source.identity)?;
        }

        for source in sources {
            if !source.image.exists() {
                return Err(GalleryError::ImageNotFound(source.image.clone()));
            }
            let image = image::open(&source.image)
                .map_err(|e| GalleryError::ImageDecode {
                    path: source.image.clone(),
                    source: e,
                })?
                .to_rgb8();

            let faces = embedder
                .detect_and_embed(&image)
                .map_err(|e| GalleryError::Embedder {
                    path: source.image.clone(),
                    source: e,
                })?;

            let face = faces
                .into_iter()
                .next()
                .ok_or_else(|| GalleryError::NoFaceInReference {
                    identity: source.identity.clone(),
                    path: source.image.clone(),
                })?;

            tracing::info!(
                identity = %source.identity,
                path = %source.image.display(),
                dim = face.embedding.dimension(),
                "loaded reference face"
            );

            entries.push(GalleryEntry {
                identity: source.identity.clone(),
                embedding: face.embedding,
            });
        }

        Self::from_entries(entries)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension shared by all entries, if any are loaded.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.dimension())
    }

    /// Distinct identity names in first-seen order.
    pub fn identities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.identity.as_str()) {
                names.push(&entry.identity);
            }
        }
        names
    }
}

/// TOML manifest listing the reference images.
///
/// ```toml
/// [[person]]
/// name = "John Doe"
/// image = "person1.jpg"
/// ```
#[derive(Debug, Deserialize)]
pub struct GalleryManifest {
    #[serde(default, rename = "person")]
    pub persons: Vec<ManifestPerson>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestPerson {
    pub name: String,
    pub image: PathBuf,
}

impl GalleryManifest {
    pub fn parse(src: &str, path: &Path) -> Result<Self, GalleryError> {
        toml::from_str(src).map_err(|e| GalleryError::ManifestParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Read a manifest and resolve image paths relative to its directory.
    pub fn load_sources(path: &Path) -> Result<Vec<GallerySource>, GalleryError> {
        let src = std::fs::read_to_string(path).map_err(|e| GalleryError::ManifestRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest = Self::parse(&src, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(manifest.into_sources(base))
    }

    pub fn into_sources(self, base: &Path) -> Vec<GallerySource> {
        self.persons
            .into_iter()
            .map(|p| GallerySource {
                identity: p.name,
                image: if p.image.is_absolute() {
                    p.image
                } else {
                    base.join(p.image)
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedFace, FaceRegion};
    use image::{Rgb, RgbImage};

    /// Reports one face per non-black image, embedding the top-left pixel colour.
    struct PixelEmbedder;

    impl FaceEmbedder for PixelEmbedder {
        fn detect_and_embed(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, EmbedderError> {
            let Rgb([r, g, b]) = *frame.get_pixel(0, 0);
            if r == 0 && g == 0 && b == 0 {
                return Ok(Vec::new());
            }
            Ok(vec![DetectedFace {
                region: FaceRegion { top: 0, right: frame.width(), bottom: frame.height(), left: 0 },
                embedding: Embedding::new(vec![r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]),
            }])
        }
    }

    fn write_image(dir: &Path, name: &str, colour: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 8, Rgb(colour)).save(&path).unwrap();
        path
    }

    #[test]
    fn test_load_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            GallerySource { identity: "John Doe".into(), image: write_image(dir.path(), "p1.png", [255, 0, 0]) },
            GallerySource { identity: "Jane Doe".into(), image: write_image(dir.path(), "p2.png", [0, 255, 0]) },
        ];

        let gallery = Gallery::load(&sources, &mut PixelEmbedder).unwrap();
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery.dimension(), Some(3));
        assert_eq!(gallery.identities(), vec!["John Doe", "Jane Doe"]);
        assert_eq!(gallery.entries()[0].embedding.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_load_faceless_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![
            GallerySource { identity: "John Doe".into(), image: write_image(dir.path(), "p1.png", [255, 0, 0]) },
            GallerySource { identity: "Nobody".into(), image: write_image(dir.path(), "blank.png", [0, 0, 0]) },
        ];

        let err = Gallery::load(&sources, &mut PixelEmbedder).unwrap_err();
        assert!(matches!(err, GalleryError::NoFaceInReference { ref identity, .. } if identity == "Nobody"));
    }

    #[test]
    fn test_load_missing_reference_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![GallerySource {
            identity: "Ghost".into(),
            image: dir.path().join("missing.png"),
        }];

        let err = Gallery::load(&sources, &mut PixelEmbedder).unwrap_err();
        assert!(matches!(err, GalleryError::ImageNotFound(_)));
    }

    #[test]
    fn test_from_entries_rejects_mixed_dimensions() {
        let entries = vec![
            GalleryEntry { identity: "a".into(), embedding: Embedding::new(vec![0.0; 4]) },
            GalleryEntry { identity: "b".into(), embedding: Embedding::new(vec![0.0; 3]) },
        ];
        let err = Gallery::from_entries(entries).unwrap_err();
        assert!(matches!(err, GalleryError::DimensionMismatch { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn test_from_entries_rejects_unknown_name() {
        let entries = vec![
            GalleryEntry { identity: "Alice".into(), embedding: Embedding::new(vec![0.0]) },
            GalleryEntry { identity: "Unknown".into(), embedding: Embedding::new(vec![1.0]) },
        ];
        let err = Gallery::from_entries(entries).unwrap_err();
        assert!(matches!(err, GalleryError::ReservedIdentity(ref name) if name == "Unknown"));
    }

    #[test]
    fn test_load_rejects_unknown_name_before_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let sources = vec![GallerySource {
            identity: "Unknown".into(),
            image: write_image(dir.path(), "u.png", [200, 10, 10]),
        }];
        let err = Gallery::load(&sources, &mut PixelEmbedder).unwrap_err();
        assert!(matches!(err, GalleryError::ReservedIdentity(_)));
    }

    #[test]
    fn test_identities_deduplicated() {
        let entries = vec![
            GalleryEntry { identity: "Alice".into(), embedding: Embedding::new(vec![0.0]) },
            GalleryEntry { identity: "Bob".into(), embedding: Embedding::new(vec![1.0]) },
            GalleryEntry { identity: "Alice".into(), embedding: Embedding::new(vec![2.0]) },
        ];
        let gallery = Gallery::from_entries(entries).unwrap();
        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.identities(), vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_manifest_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("gallery.toml");
        std::fs::write(
            &manifest_path,
            r#"
[[person]]
name = "John Doe"
image = "person1.jpg"

[[person]]
name = "Jane Doe"
image = "/srv/faces/person2.jpg"
"#,
        )
        .unwrap();

        let sources = GalleryManifest::load_sources(&manifest_path).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].identity, "John Doe");
        assert_eq!(sources[0].image, dir.path().join("person1.jpg"));
        assert_eq!(sources[1].image, PathBuf::from("/srv/faces/person2.jpg"));
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = GalleryManifest::parse("", Path::new("gallery.toml")).unwrap();
        assert!(manifest.into_sources(Path::new(".")).is_empty());
    }

    #[test]
    fn test_invalid_manifest() {
        let err = GalleryManifest::parse("[[person]]\nname = 3", Path::new("gallery.toml")).unwrap_err();
        assert!(matches!(err, GalleryError::ManifestParse { .. }));
    }
}
