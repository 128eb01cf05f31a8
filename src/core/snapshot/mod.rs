#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::session::GenerationOutput;
use crate::core::transformer::{FlowTree, Pipelines};
use crate::core::types::ErrorCategory;
use crate::utils::serialization::{FileSerializer, FileUtils, YamlSerializer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

const SNAPSHOT_SUFFIX: &str = ".apiflows.yaml";
const META_SUFFIX: &str = ".apiflows.meta.yaml";
const POINTS_SUFFIX: &str = ".points.yaml";
const STUBS_SUFFIX: &str = ".stubs.yaml";

/// Paths written for one feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFiles {
    pub snapshot: PathBuf,
    pub meta: PathBuf,
    pub points: PathBuf,
    pub stubs: PathBuf,
}

impl SnapshotFiles {
    pub fn for_feature(base_dir: &Path, feature: &str) -> Self {
        let path = |suffix: &str| base_dir.join(format!("{}{}", feature, suffix));
        Self {
            snapshot: path(SNAPSHOT_SUFFIX),
            meta: path(META_SUFFIX),
            points: path(POINTS_SUFFIX),
            stubs: path(STUBS_SUFFIX),
        }
    }
}

/// Writes generation artifacts next to the feature's tests.
pub struct SnapshotWriter {
    files: SnapshotFiles,
}

impl SnapshotWriter {
    pub fn new(base_dir: impl AsRef<Path>, feature: &str) -> Self {
        Self {
            files: SnapshotFiles::for_feature(base_dir.as_ref(), feature),
        }
    }

    pub fn files(&self) -> &SnapshotFiles {
        &self.files
    }

    /// Write the snapshot tree, its `_meta` variant, the point registry and the stubs used.
    pub fn write(&self, output: &GenerationOutput) -> Result<&SnapshotFiles, AppError> {
        save(&self.files.meta, &output.meta_tree)?;
        save(&self.files.snapshot, &output.tree)?;
        save(&self.files.points, &output.registry)?;
        save(&self.files.stubs, &output.data_used)?;
        tracing::info!(
            snapshot = %self.files.snapshot.display(),
            tests = output.pipelines.len(),
            "snapshot written"
        );
        Ok(&self.files)
    }
}

pub fn save<T: Serialize>(path: &Path, data: &T) -> Result<(), AppError> {
    FileUtils
        .save_to_file(path, data, &YamlSerializer)
        .map_err(|e| {
            AppError::new(ErrorCategory::IoError, format!("{:#}", e))
                .with_code("SNAP-002")
                .with_context(path.display().to_string())
        })
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    FileUtils.load_from_file(path, &YamlSerializer).map_err(|e| {
        AppError::new(
            ErrorCategory::SerializationError,
            format!("Failed to load {}: {:#}", path.display(), e),
        )
        .with_code("SNAP-001")
    })
}

/// Load a folded snapshot.
pub fn load_tree(path: &Path) -> Result<FlowTree, AppError> {
    load(path)
}

/// Load captured pipelines: test name to its list of raw points.
pub fn load_pipelines(path: &Path) -> Result<Pipelines, AppError> {
    load(path)
}
