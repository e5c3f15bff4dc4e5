//! Finished recording artifact

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// The downloadable result of a recording: one video track plus at most one
/// mixed audio track in a single container.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Timestamped, so repeated downloads never collide
    pub file_name: String,
    pub duration_seconds: u64,
    pub segment_count: usize,
    pub created_at: DateTime<Utc>,
}

impl RecordingArtifact {
    /// Concatenate encoder chunks in order
    pub fn from_chunks(
        chunks: Vec<Vec<u8>>,
        mime_type: &str,
        file_name: String,
        duration_seconds: u64,
        segment_count: usize,
    ) -> Self {
        let total = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }

        Self {
            bytes,
            mime_type: mime_type.to_string(),
            file_name,
            duration_seconds,
            segment_count,
            created_at: Utc::now(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Write the artifact into `dir` under its file name
    pub fn save_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;

        tracing::info!("Saved recording ({} bytes) to {:?}", self.bytes.len(), path);
        Ok(path)
    }
}

/// `{prefix}-{YYYY-MM-DD_HH-MM-SS}.{ext}`
pub fn artifact_file_name(prefix: &str, extension: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}.{}", prefix, at.format("%Y-%m-%d_%H-%M-%S"), extension)
}
