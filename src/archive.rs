use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::labeling::{AnnotationRecord, RunSummary};
use crate::utils::has_valid_extension;

/// One discovered image: the display name used in the output bundle and
/// the path of the extracted file. Read-only through the pipeline.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub name: String,
    pub path: PathBuf,
}

/// Unpack the input archive into `work_dir` and discover every image entry.
///
/// Entries with a recognized extension (case-insensitive) are collected at
/// any nesting depth; everything else is ignored, not an error. Results are
/// sorted by path so processing order is stable, and duplicate display
/// names are disambiguated so the flat output layout never overwrites.
///
/// An archive that cannot be opened or parsed is fatal and aborts the run
/// before any processing.
pub fn extract(input_zip: &Path, work_dir: &Path, extensions: &[String]) -> Result<Vec<ImageRecord>> {
    let file = File::open(input_zip)
        .with_context(|| format!("failed to open input archive: {}", input_zip.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read input archive: {}", input_zip.display()))?;
    archive
        .extract(work_dir)
        .with_context(|| format!("failed to unpack input archive: {}", input_zip.display()))?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(work_dir).follow_links(false) {
        let entry = entry.context("failed to read extracted entry")?;
        let path = entry.path();
        if path.is_file() && has_valid_extension(path, extensions) {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let records = paths
        .into_iter()
        .map(|path| {
            let base = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("image")
                .to_string();
            ImageRecord {
                name: unique_name(&mut seen, &base),
                path,
            }
        })
        .collect();

    Ok(records)
}

/// Disambiguate repeated display names: `photo.jpg`, `photo-1.jpg`, ...
fn unique_name(seen: &mut HashMap<String, usize>, base: &str) -> String {
    let count = seen.entry(base.to_string()).or_insert(0);
    *count += 1;
    if *count == 1 {
        return base.to_string();
    }

    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, *count - 1, ext),
        None => format!("{}-{}", base, *count - 1),
    }
}

/// Bundle the accepted images and their annotations into one output archive.
///
/// Image bytes are copied unchanged into `images/`; each annotation is
/// serialized as pretty JSON into `annotations/<name>.json`. Entry order
/// follows the (sorted) discovery order and timestamps are fixed, so two
/// runs over the same input produce byte-identical archives.
///
/// Any write failure is fatal; no partial bundle is offered.
pub fn pack(output_zip: &Path, accepted: &[(ImageRecord, AnnotationRecord)]) -> Result<()> {
    let file = File::create(output_zip)
        .with_context(|| format!("failed to create output archive: {}", output_zip.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for (record, annotation) in accepted {
        let bytes = fs::read(&record.path)
            .with_context(|| format!("failed to read accepted image: {}", record.path.display()))?;
        writer
            .start_file(format!("images/{}", record.name), options)
            .with_context(|| format!("failed to add image entry for {}", record.name))?;
        writer.write_all(&bytes)?;

        let json = serde_json::to_vec_pretty(annotation)
            .with_context(|| format!("failed to serialize annotation for {}", record.name))?;
        writer
            .start_file(format!("annotations/{}.json", record.name), options)
            .with_context(|| format!("failed to add annotation entry for {}", record.name))?;
        writer.write_all(&json)?;
    }

    writer
        .finish()
        .with_context(|| format!("failed to finalize output archive: {}", output_zip.display()))?;
    Ok(())
}

/// Human-readable run report with one count per terminal state.
pub fn summarize(summary: &RunSummary) -> String {
    format!(
        "{} image(s) labeled, {} skipped (not a selfie), {} skipped (no spot detected), {} failed",
        summary.accepted, summary.skipped_not_selfie, summary.skipped_no_spot, summary.failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::SpotBox;
    use std::io::Read;

    fn write_test_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    fn default_extensions() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_extract_discovers_nested_images_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("input.zip");
        write_test_zip(
            &zip_path,
            &[
                ("a.jpg", b"one"),
                ("nested/deep/B.PNG", b"two"),
                ("nested/photo.JPEG", b"three"),
                ("readme.txt", b"not an image"),
            ],
        );

        let work_dir = dir.path().join("work");
        let records = extract(&zip_path, &work_dir, &default_extensions()).unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"a.jpg"));
        assert!(names.contains(&"B.PNG"));
        assert!(names.contains(&"photo.JPEG"));
    }

    #[test]
    fn test_extract_rejects_unreadable_archive() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("broken.zip");
        fs::write(&zip_path, b"this is not a zip file").unwrap();

        let result = extract(&zip_path, &dir.path().join("work"), &default_extensions());
        assert!(result.is_err());
    }

    #[test]
    fn test_unique_name_disambiguates_duplicates() {
        let mut seen = HashMap::new();
        assert_eq!(unique_name(&mut seen, "photo.jpg"), "photo.jpg");
        assert_eq!(unique_name(&mut seen, "photo.jpg"), "photo-1.jpg");
        assert_eq!(unique_name(&mut seen, "photo.jpg"), "photo-2.jpg");
        assert_eq!(unique_name(&mut seen, "other.png"), "other.png");
        assert_eq!(unique_name(&mut seen, "noext"), "noext");
        assert_eq!(unique_name(&mut seen, "noext"), "noext-1");
    }

    #[test]
    fn test_pack_layout_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("selfie1.jpg");
        fs::write(&image_path, b"raw image bytes").unwrap();

        let record = ImageRecord {
            name: "selfie1.jpg".to_string(),
            path: image_path,
        };
        let annotation = AnnotationRecord::new(
            "selfie1.jpg".to_string(),
            vec![SpotBox {
                x1: 100,
                y1: 100,
                x2: 300,
                y2: 300,
            }],
        );

        let output = dir.path().join("labels.zip");
        pack(&output, &[(record, annotation)]).unwrap();

        let mut archive = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "annotations/selfie1.jpg.json".to_string(),
                "images/selfie1.jpg".to_string()
            ]
        );

        let mut image_bytes = Vec::new();
        archive
            .by_name("images/selfie1.jpg")
            .unwrap()
            .read_to_end(&mut image_bytes)
            .unwrap();
        assert_eq!(image_bytes, b"raw image bytes");

        let mut json = String::new();
        archive
            .by_name("annotations/selfie1.jpg.json")
            .unwrap()
            .read_to_string(&mut json)
            .unwrap();
        let parsed: AnnotationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.filename, "selfie1.jpg");
        assert_eq!(parsed.selfie, "selfie");
        assert_eq!(parsed.spots.len(), 1);
    }

    #[test]
    fn test_pack_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("a.png");
        fs::write(&image_path, b"pixels").unwrap();

        let accepted = vec![(
            ImageRecord {
                name: "a.png".to_string(),
                path: image_path,
            },
            AnnotationRecord::new(
                "a.png".to_string(),
                vec![SpotBox {
                    x1: 0,
                    y1: 0,
                    x2: 5,
                    y2: 5,
                }],
            ),
        )];

        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        pack(&first, &accepted).unwrap();
        pack(&second, &accepted).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_summarize_reports_all_four_counts() {
        let summary = RunSummary {
            accepted: 3,
            skipped_not_selfie: 2,
            skipped_no_spot: 1,
            failed: 1,
        };
        let text = summarize(&summary);
        assert!(text.contains("3 image(s) labeled"));
        assert!(text.contains("2 skipped (not a selfie)"));
        assert!(text.contains("1 skipped (no spot detected)"));
        assert!(text.contains("1 failed"));
    }
}
