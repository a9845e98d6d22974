//! Manifest and file-tree fixtures for batch pipeline tests.

use std::fs;
use std::io;
use std::path::Path;

use cordon_config::{BatchManifest, FileMapping, LoggingSettings, RetryPolicy};
use tempfile::TempDir;

/// Create a temporary root directory for a test run.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_root() -> io::Result<TempDir> {
    tempfile::Builder::new().prefix("cordon-test-").tempdir()
}

/// Build a manifest rooted at `root` for the given `(file name, label)` pairs.
///
/// Sources live under `<root>/input`, templates under `<root>/templates` and
/// outputs under `<root>/output`, mirroring the layout the application
/// produces.
#[must_use]
pub fn sample_manifest(root: &Path, files: &[(&str, &str)]) -> BatchManifest {
    BatchManifest {
        canonical_plaintext: root.join("input").join("canonical.txt"),
        template_dir: root.join("templates"),
        output_dir: root.join("output"),
        files: files
            .iter()
            .map(|(name, label)| FileMapping::new(root.join("input").join(name), *label))
            .collect(),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            backoff_multiplier: 2,
        },
        logging: LoggingSettings::default(),
    }
}

/// Write the plaintext input tree the manifest from [`sample_manifest`] expects.
///
/// # Errors
///
/// Returns an error if any directory or file cannot be created.
pub fn write_sample_tree(root: &Path, files: &[(&str, &str)]) -> io::Result<()> {
    let input = root.join("input");
    fs::create_dir_all(&input)?;
    fs::write(input.join("canonical.txt"), "canonical template body\n")?;
    for (name, label) in files {
        fs::write(input.join(name), format!("plaintext body of {name} ({label})\n"))?;
    }
    Ok(())
}
