use std::collections::HashSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::ImageReader;
use resize_pack_core::{PackSummary, SourceImage, MAX_BATCH_SIZE};
use tracing::warn;

/// Paths split at the batch limit. Only `admitted` paths are ever read.
#[derive(Debug, Default)]
pub struct Admission {
    pub admitted: Vec<PathBuf>,
    pub rejected: Vec<PathBuf>,
}

/// Images ready for the pipeline plus the admitted files that could not be probed.
#[derive(Debug, Default)]
pub struct LoadedImages {
    pub images: Vec<SourceImage>,
    pub unreadable: Vec<String>,
    /// Identifier of every admitted path, in admission order
    pub identifiers: Vec<String>,
}

impl LoadedImages {
    /// Fold the unprobeable files into the pipeline's summary, listing every
    /// failure in the order its path was admitted.
    pub fn merge_summary(&self, summary: PackSummary) -> PackSummary {
        let failed: HashSet<&str> = summary
            .failed_identifiers
            .iter()
            .chain(&self.unreadable)
            .map(String::as_str)
            .collect();
        let failed_identifiers: Vec<String> = self
            .identifiers
            .iter()
            .filter(|id| failed.contains(id.as_str()))
            .cloned()
            .collect();
        PackSummary {
            succeeded: summary.succeeded,
            failed: failed_identifiers.len() as u64,
            failed_identifiers,
        }
    }
}

fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map_or(false, |mime| mime.type_() == mime_guess::mime::IMAGE)
}

/// Expand the command-line inputs into image paths.
///
/// Files are taken in the order given; directories contribute their direct
/// image children sorted by path.
pub fn collect_paths(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut children: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("reading directory {}", input.display()))?
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_image(path))
                .collect();
            children.sort();
            paths.extend(children);
        } else if is_image(input) {
            paths.push(input.clone());
        } else {
            warn!(path = %input.display(), "not an image file, ignoring");
        }
    }
    Ok(paths)
}

/// Cap the batch before anything is read from disk.
pub fn admit(mut paths: Vec<PathBuf>) -> Admission {
    let rejected = if paths.len() > MAX_BATCH_SIZE {
        paths.split_off(MAX_BATCH_SIZE)
    } else {
        Vec::new()
    };
    Admission {
        admitted: paths,
        rejected,
    }
}

/// Read admitted files and probe their dimensions from the header.
pub fn load_images(paths: &[PathBuf]) -> anyhow::Result<LoadedImages> {
    let mut used: HashSet<String> = HashSet::new();
    let mut loaded = LoadedImages::default();

    for path in paths {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let identifier = unique_identifier(path, &mut used);
        loaded.identifiers.push(identifier.clone());

        match probe_dimensions(&bytes) {
            Ok((width, height)) if width > 0 && height > 0 => {
                loaded.images.push(SourceImage::new(identifier, bytes, width, height));
            }
            Ok((width, height)) => {
                warn!(%identifier, width, height, "image has no pixels, skipping");
                loaded.unreadable.push(identifier);
            }
            Err(error) => {
                warn!(%identifier, %error, "cannot read image header, skipping");
                loaded.unreadable.push(identifier);
            }
        }
    }
    Ok(loaded)
}

fn probe_dimensions(bytes: &[u8]) -> image::ImageResult<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// File name of `path`, suffixed `name(n).ext` when already taken.
fn unique_identifier(path: &Path, used: &mut HashSet<String>) -> String {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    if used.insert(filename.clone()) {
        return filename;
    }

    let stem = Path::new(&filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let ext = Path::new(&filename)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");

    let mut counter = 1u32;
    loop {
        let candidate = if ext.is_empty() {
            format!("{}({})", stem, counter)
        } else {
            format!("{}({}).{}", stem, counter, ext)
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::new(width, height)
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn test_collect_filters_and_sorts_directory() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 2, 2);
        write_png(&dir.path().join("a.png"), 2, 2);
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let paths = collect_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.png", "b.png"]);
    }

    #[test]
    fn test_collect_keeps_explicit_file_order() {
        let dir = tempdir().unwrap();
        let z = dir.path().join("z.jpg");
        let a = dir.path().join("a.gif");
        let readme = dir.path().join("README");
        let paths = collect_paths(&[z.clone(), readme, a.clone()]).unwrap();
        assert_eq!(paths, [z, a]);
    }

    #[test]
    fn test_admit_caps_batch() {
        let paths: Vec<PathBuf> = (0..35).map(|i| PathBuf::from(format!("{i}.png"))).collect();
        let admission = admit(paths);
        assert_eq!(admission.admitted.len(), MAX_BATCH_SIZE);
        assert_eq!(admission.rejected.len(), 5);
        assert_eq!(admission.rejected[0], PathBuf::from("30.png"));

        let small = admit(vec![PathBuf::from("one.png")]);
        assert_eq!(small.admitted.len(), 1);
        assert!(small.rejected.is_empty());
    }

    #[test]
    fn test_unique_identifiers() {
        let mut used = HashSet::new();
        assert_eq!(unique_identifier(Path::new("x/photo.png"), &mut used), "photo.png");
        assert_eq!(unique_identifier(Path::new("y/photo.png"), &mut used), "photo(1).png");
        assert_eq!(unique_identifier(Path::new("z/photo.png"), &mut used), "photo(2).png");
        assert_eq!(unique_identifier(Path::new("a/LICENSE"), &mut used), "LICENSE");
        assert_eq!(unique_identifier(Path::new("b/LICENSE"), &mut used), "LICENSE(1)");
    }

    #[test]
    fn test_load_probes_dimensions() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.png");
        let bad = dir.path().join("bad.png");
        write_png(&good, 40, 30);
        fs::write(&bad, b"garbage").unwrap();

        let loaded = load_images(&[good, bad]).unwrap();
        assert_eq!(loaded.images.len(), 1);
        let image = &loaded.images[0];
        assert_eq!(image.identifier, "good.png");
        assert_eq!((image.original_width, image.original_height), (40, 30));
        assert_eq!(loaded.unreadable, ["bad.png"]);
    }

    #[test]
    fn test_failures_listed_in_admission_order() {
        let dir = tempdir().unwrap();
        let b = dir.path().join("b.png");
        let a = dir.path().join("a.png");
        let c = dir.path().join("c.png");
        fs::write(&b, b"not a png").unwrap();
        write_png(&a, 40, 30);
        write_png(&c, 40, 30);

        let loaded = load_images(&[b, a, c]).unwrap();
        assert_eq!(loaded.identifiers, ["b.png", "a.png", "c.png"]);

        // a.png probed fine but failed to transcode
        let from_pipeline = PackSummary {
            succeeded: 1,
            failed: 1,
            failed_identifiers: vec!["a.png".to_string()],
        };
        let summary = loaded.merge_summary(from_pipeline);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failed_identifiers, ["b.png", "a.png"]);
    }

    #[test]
    fn test_merge_without_failures() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        write_png(&a, 40, 30);
        let loaded = load_images(&[a]).unwrap();
        let summary = loaded.merge_summary(PackSummary {
            succeeded: 1,
            ..PackSummary::default()
        });
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 0);
        assert!(summary.failed_identifiers.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(load_images(&[dir.path().join("missing.png")]).is_err());
    }
}
