//! The corpus manifest: index source and range partitioner.
//!
//! The manifest is a newline-delimited list of relative document paths in
//! remote storage; its line order defines every partition boundary in the
//! system. A cluster task fetches it once, takes its assigned
//! `[offset, offset+length)` slice, and splits the slice into fixed-size
//! minibatches.
//!
//! Minibatch granularity is the fault/amortization trade-off: a worker that
//! dies mid-minibatch loses at most the unprocessed remainder of that one
//! minibatch, while every minibatch pays the expensive engine load exactly
//! once across all of its documents.

use crate::cluster::JobRange;
use crate::error::Corpus2MdError;
use crate::storage::{ObjectStore, StorageLocation};
use std::fmt;
use tracing::info;

/// One line of the manifest: an opaque relative path locating a source
/// document. Stored raw (readable in logs); percent-encoding happens when
/// the entry is embedded into a URL via [`StorageLocation::join`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry(String);

impl ManifestEntry {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment, used to name the local scratch copy.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The relative path minus its extension (the extension of the final
    /// segment only; dots in directory names are left alone).
    fn stem(&self) -> &str {
        let dir_end = self.0.rfind('/').map(|i| i + 1).unwrap_or(0);
        match self.0[dir_end..].rfind('.') {
            Some(dot) => &self.0[..dir_end + dot],
            None => &self.0,
        }
    }

    /// The relative path with the extension replaced: `A/B/doc.pdf` with
    /// `"md"` gives `A/B/doc.md`. An entry without an extension gets one
    /// appended.
    pub fn with_extension(&self, ext: &str) -> String {
        format!("{}.{}", self.stem(), ext)
    }

    /// The relative path with the extension replaced by a suffix:
    /// `A/B/doc.pdf` with `"_meta.json"` gives `A/B/doc_meta.json`.
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}", self.stem(), suffix)
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse manifest text: one entry per line, trimmed, blank lines dropped.
pub fn parse_manifest(text: &str) -> Vec<ManifestEntry> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ManifestEntry::new)
        .collect()
}

/// Take the `[offset, offset+length)` slice, clamped to what exists.
///
/// An `offset` at or past the end yields an empty slice, not an error: a
/// range is allowed to extend past the manifest.
pub fn slice_range(entries: Vec<ManifestEntry>, range: JobRange) -> Vec<ManifestEntry> {
    entries
        .into_iter()
        .skip(range.offset)
        .take(range.length)
        .collect()
}

/// Fetch the manifest once and return this task's slice of it.
pub async fn resolve_range(
    store: &dyn ObjectStore,
    index: &StorageLocation,
    range: JobRange,
) -> Result<Vec<ManifestEntry>, Corpus2MdError> {
    let entries = fetch_manifest(store, index).await?;
    let total = entries.len();
    let slice = slice_range(entries, range);
    info!(
        "manifest: {} entries total, slice [{}, {}) -> {} entries",
        total,
        range.offset,
        range.offset + range.length.min(total.saturating_sub(range.offset)),
        slice.len()
    );
    Ok(slice)
}

/// Fetch the manifest once and count its entries. Used by the job
/// distributor to plan ranges.
pub async fn count_entries(
    store: &dyn ObjectStore,
    index: &StorageLocation,
) -> Result<usize, Corpus2MdError> {
    Ok(fetch_manifest(store, index).await?.len())
}

async fn fetch_manifest(
    store: &dyn ObjectStore,
    index: &StorageLocation,
) -> Result<Vec<ManifestEntry>, Corpus2MdError> {
    let scratch = tempfile::tempdir().map_err(|e| Corpus2MdError::ManifestUnavailable {
        detail: format!("scratch dir: {e}"),
    })?;
    let local = scratch.path().join("index.txt");

    store
        .fetch(index.url(), &local)
        .await
        .map_err(|e| Corpus2MdError::ManifestUnavailable {
            detail: e.to_string(),
        })?;

    let text = tokio::fs::read_to_string(&local).await.map_err(|e| {
        Corpus2MdError::ManifestUnavailable {
            detail: format!("read fetched index: {e}"),
        }
    })?;

    Ok(parse_manifest(&text))
}

/// Split entries, in order, into chunks of `minibatch_size`; the final
/// chunk may be shorter. A size of zero is a configuration error.
pub fn partition_into_minibatches(
    entries: &[ManifestEntry],
    minibatch_size: usize,
) -> Result<Vec<Vec<ManifestEntry>>, Corpus2MdError> {
    if minibatch_size == 0 {
        return Err(Corpus2MdError::InvalidConfig(
            "minibatch size must be >= 1".into(),
        ));
    }
    Ok(entries
        .chunks(minibatch_size)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Default minibatch size when none is configured: two minibatches per
/// worker over the range, never below one.
pub fn default_minibatch_size(range_length: usize, workers: usize) -> usize {
    (range_length / (workers.max(1) * 2)).max(1)
}
