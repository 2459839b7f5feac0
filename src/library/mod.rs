//! The user's source library.
//!
//! A [`Library`] owns the [`BibliographyResolver`] (canonical works) and the
//! [`SourceIndex`] (passages). Ingestion mutates it through `&mut self`;
//! analysis runs share an immutable [`Library::snapshot`].

mod index;
mod resolver;

pub use index::{chunk_pages, IndexStats, SourceIndex, CHUNK_MIN, CHUNK_TARGET};
pub use resolver::{canonicalize, extract_year, identity_key, BibliographyResolver, Resolved};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{PageText, Passage, RawMetadata, Work, WorkId};
use crate::utils::{extract_pdf, load_bibliography, BibliographyError, PdfExtractError};

/// Library format version written to disk
const LIBRARY_VERSION: u32 = 1;

/// Errors from the library layer
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Library has no indexed passages")]
    NotIndexed,

    #[error("Ambiguous metadata: record matches distinct works {}", format_ids(.work_ids))]
    AmbiguousMetadata { work_ids: Vec<WorkId> },

    #[error("Unknown work: {0}")]
    UnknownWork(WorkId),

    #[error("Work {0} is still referenced by a citation")]
    InUse(WorkId),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Pdf(#[from] PdfExtractError),

    #[error(transparent)]
    Bibliography(#[from] BibliographyError),
}

fn format_ids(ids: &[WorkId]) -> String {
    ids.iter().map(WorkId::as_str).collect::<Vec<_>>().join(", ")
}

/// Summary of a bibliography import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub added: Vec<WorkId>,
    pub merged: Vec<WorkId>,
    /// Records left for manual resolution, with the reason
    pub rejected: Vec<(String, String)>,
}

/// Summary statistics for `library stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub works: usize,
    pub indexed_works: usize,
    pub passages: usize,
    pub pages: usize,
    pub characters: usize,
}

/// Works plus their indexed passages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Library {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    resolver: BibliographyResolver,
    #[serde(default)]
    index: SourceIndex,
}

fn default_version() -> u32 {
    LIBRARY_VERSION
}

impl Library {
    pub fn new() -> Self {
        Self {
            version: LIBRARY_VERSION,
            ..Default::default()
        }
    }

    /// Load a library file; a missing file yields an empty library
    pub fn load(path: &Path) -> Result<Self, LibraryError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no library file, starting empty");
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let library: Library =
            serde_json::from_str(&content).map_err(|e| LibraryError::Parse(e.to_string()))?;
        tracing::debug!(
            path = %path.display(),
            works = library.resolver.len(),
            passages = library.index.len(),
            "loaded library"
        );
        Ok(library)
    }

    /// Write the library as JSON, replacing the file atomically
    pub fn save(&self, path: &Path) -> Result<(), LibraryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|e| LibraryError::Parse(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read-only view for analysis runs
    pub fn snapshot(&self) -> Arc<Library> {
        Arc::new(self.clone())
    }

    pub fn resolver(&self) -> &BibliographyResolver {
        &self.resolver
    }

    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    pub fn work(&self, work_id: &WorkId) -> Option<&Work> {
        self.resolver.get(work_id)
    }

    pub fn works(&self) -> impl Iterator<Item = &Work> {
        self.resolver.works()
    }

    /// Resolve `raw` into a work and index its pages
    pub fn add_work(&mut self, raw: RawMetadata, pages: &[PageText]) -> Result<WorkId, LibraryError> {
        let work = self.resolver.resolve(raw)?;
        if !pages.is_empty() {
            let passages = self.index.add_work(&work.work_id, pages);
            tracing::info!(work_id = %work.work_id, title = %work.title, passages, "added work");
        }
        Ok(work.work_id)
    }

    /// Extract a PDF and add it, attaching it to a matching bibliography
    /// record when one exists.
    pub fn add_pdf(&mut self, path: &Path) -> Result<WorkId, LibraryError> {
        let extracted = extract_pdf(path)?;
        if extracted.is_empty() {
            tracing::warn!(path = %path.display(), "PDF has no extractable text; metadata only");
        }

        let first_author = extracted.metadata.authors.first().map(String::as_str);
        let matched = self
            .resolver
            .find_match(&extracted.metadata.title, first_author)
            .map(|w| w.work_id.clone());
        if let Some(work_id) = matched {
            let passages = self.index.add_work(&work_id, &extracted.pages);
            tracing::info!(work_id = %work_id, passages, "attached PDF to bibliography record");
            return Ok(work_id);
        }

        tracing::debug!(
            path = %path.display(),
            academic_confidence = extracted.academic_confidence,
            "no bibliography record for PDF"
        );
        self.add_work(extracted.metadata, &extracted.pages)
    }

    /// Route bibliography records through the resolver.
    ///
    /// Ambiguous or invalid records are collected in the report; the rest are
    /// added or merged.
    pub fn import_records(&mut self, records: Vec<RawMetadata>) -> ImportReport {
        let mut report = ImportReport::default();
        for raw in records {
            let title = raw.title.clone();
            match self.resolver.resolve_detailed(raw) {
                Ok(resolved) if resolved.created => report.added.push(resolved.work.work_id),
                Ok(resolved) => report.merged.push(resolved.work.work_id),
                Err(e) => {
                    tracing::warn!(title = %title, error = %e, "bibliography record needs manual resolution");
                    report.rejected.push((title, e.to_string()));
                }
            }
        }
        tracing::info!(
            added = report.added.len(),
            merged = report.merged.len(),
            rejected = report.rejected.len(),
            "imported bibliography"
        );
        report
    }

    /// Import a bibliography file (plain-text export or JSON)
    pub fn import_file(&mut self, path: &Path) -> Result<ImportReport, LibraryError> {
        let records = load_bibliography(path)?;
        Ok(self.import_records(records))
    }

    /// Remove a work and its passages unless it is in `referenced`
    pub fn remove_work(
        &mut self,
        work_id: &WorkId,
        referenced: &BTreeSet<WorkId>,
    ) -> Result<Work, LibraryError> {
        if referenced.contains(work_id) {
            return Err(LibraryError::InUse(work_id.clone()));
        }
        let work = self
            .resolver
            .remove(work_id)
            .ok_or_else(|| LibraryError::UnknownWork(work_id.clone()))?;
        self.index.remove_work(work_id);
        tracing::info!(work_id = %work_id, "removed work");
        Ok(work)
    }

    /// Lexical passage search
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<(Passage, f64)>, LibraryError> {
        self.index.search(query, top_k)
    }

    pub fn stats(&self) -> LibraryStats {
        let index = self.index.stats();
        LibraryStats {
            works: self.resolver.len(),
            indexed_works: index.works,
            passages: index.passages,
            pages: index.pages,
            characters: index.characters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataBuilder;
    use tempfile::TempDir;

    fn smith_2020() -> RawMetadata {
        MetadataBuilder::new("Forest carbon sinks")
            .author("Smith")
            .year("2020")
            .build()
    }

    #[test]
    fn test_add_work_and_search() {
        let mut library = Library::new();
        let id = library
            .add_work(smith_2020(), &[PageText::new(1, "Trees sequester carbon at rate X")])
            .unwrap();

        let results = library.search("Trees absorb carbon dioxide.", 5).unwrap();
        assert_eq!(results[0].0.work_id, id);
        assert_eq!(library.stats().passages, 1);
        assert_eq!(library.stats().works, 1);
    }

    #[test]
    fn test_empty_library_is_not_indexed() {
        let library = Library::new();
        assert!(matches!(library.search("x", 5), Err(LibraryError::NotIndexed)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("library.json");

        let mut library = Library::new();
        let id = library
            .add_work(smith_2020(), &[PageText::new(1, "Trees sequester carbon at rate X")])
            .unwrap();
        library.save(&path).unwrap();

        let loaded = Library::load(&path).unwrap();
        assert_eq!(loaded.work(&id).map(|w| w.title.as_str()), Some("Forest carbon sinks"));
        assert_eq!(
            loaded.search("carbon", 1).unwrap()[0].1,
            library.search("carbon", 1).unwrap()[0].1
        );
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let library = Library::load(&dir.path().join("none.json")).unwrap();
        assert_eq!(library.stats(), LibraryStats::default());
    }

    #[test]
    fn test_import_report() {
        let mut library = Library::new();
        let records = vec![
            smith_2020(),
            MetadataBuilder::new("Forest Carbon Sinks").author("SMITH").year("2020").container("Nature").build(),
            MetadataBuilder::new("").build(),
        ];
        let report = library.import_records(records);
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.added[0], report.merged[0]);
    }

    #[test]
    fn test_remove_work_respects_references() {
        let mut library = Library::new();
        let id = library
            .add_work(smith_2020(), &[PageText::new(1, "Trees sequester carbon at rate X")])
            .unwrap();

        let referenced: BTreeSet<WorkId> = [id.clone()].into_iter().collect();
        assert!(matches!(library.remove_work(&id, &referenced), Err(LibraryError::InUse(_))));

        library.remove_work(&id, &BTreeSet::new()).unwrap();
        assert!(library.work(&id).is_none());
        assert!(library.index().is_empty());
        assert!(matches!(
            library.remove_work(&id, &BTreeSet::new()),
            Err(LibraryError::UnknownWork(_))
        ));
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let mut library = Library::new();
        library.add_work(smith_2020(), &[PageText::new(1, "Trees sequester carbon")]).unwrap();
        let snapshot = library.snapshot();
        library
            .add_work(
                MetadataBuilder::new("Ocean heat").author("Lee").year("2019").build(),
                &[PageText::new(1, "Oceans absorb heat")],
            )
            .unwrap();
        assert_eq!(snapshot.stats().works, 1);
        assert_eq!(library.stats().works, 2);
    }
}
