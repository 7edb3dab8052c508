use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use etl_model::{EtlError, ProjectMetadata, Result, SourceRecord};
use tracing::{debug, info};

use crate::format::RecordFormat;
use crate::grouping::group_rows;

/// Metadata file inside an export directory.
pub const PROJECT_FILE: &str = "project.json";

/// Supplier of project metadata and records, batch by batch.
pub trait RecordSource {
    fn metadata(&mut self) -> Result<ProjectMetadata>;

    /// Up to `max_records` records, `None` once the source is exhausted.
    fn next_batch(&mut self, max_records: usize) -> Result<Option<Vec<SourceRecord>>>;
}

fn take_batch(
    pending: &mut VecDeque<SourceRecord>,
    max_records: usize,
) -> Option<Vec<SourceRecord>> {
    if pending.is_empty() {
        return None;
    }
    let take = pending.len().min(max_records.max(1));
    Some(pending.drain(..take).collect())
}

/// Reads an export directory: `project.json` plus `records.<format>`.
#[derive(Debug)]
pub struct ExportDirSource {
    dir: PathBuf,
    format: RecordFormat,
    metadata: Option<ProjectMetadata>,
    pending: Option<VecDeque<SourceRecord>>,
}

impl ExportDirSource {
    pub fn new(dir: impl Into<PathBuf>, format: RecordFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            metadata: None,
            pending: None,
        }
    }

    /// Open `dir`, taking the format of the first records file present.
    pub fn detect(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let format = RecordFormat::ALL
            .into_iter()
            .find(|format| dir.join(format.file_name()).is_file())
            .ok_or_else(|| {
                EtlError::source(format!(
                    "no records.json, records.csv or records.xml in {}",
                    dir.display()
                ))
            })?;
        Ok(Self::new(dir, format))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.dir.join(name);
        fs::read_to_string(&path)
            .map_err(|error| EtlError::source(format!("cannot read {}: {error}", path.display())))
    }

    fn load_metadata(&mut self) -> Result<&ProjectMetadata> {
        if self.metadata.is_none() {
            let text = self.read(PROJECT_FILE)?;
            let metadata: ProjectMetadata = serde_json::from_str(&text).map_err(|error| {
                EtlError::source(format!("invalid {PROJECT_FILE}: {error}"))
            })?;
            if metadata.fields.is_empty() {
                return Err(EtlError::source(format!("{PROJECT_FILE} declares no fields")));
            }
            info!(
                dir = %self.dir.display(),
                fields = metadata.fields.len(),
                events = metadata.events.len(),
                "loaded project metadata"
            );
            self.metadata = Some(metadata);
        }
        self.metadata
            .as_ref()
            .ok_or_else(|| EtlError::source("project metadata unavailable"))
    }

    fn load_records(&mut self) -> Result<()> {
        let record_id_field = self.load_metadata()?.record_id_field().to_string();
        let text = self.read(&self.format.file_name())?;
        let rows = self.format.decode(&text)?;
        let row_count = rows.len();
        let records = group_rows(rows, &record_id_field)?;
        info!(
            format = %self.format,
            rows = row_count,
            records = records.len(),
            "decoded records"
        );
        self.pending = Some(records.into());
        Ok(())
    }
}

impl RecordSource for ExportDirSource {
    fn metadata(&mut self) -> Result<ProjectMetadata> {
        self.load_metadata().cloned()
    }

    fn next_batch(&mut self, max_records: usize) -> Result<Option<Vec<SourceRecord>>> {
        if self.pending.is_none() {
            self.load_records()?;
        }
        let batch = self
            .pending
            .as_mut()
            .and_then(|pending| take_batch(pending, max_records));
        if let Some(batch) = &batch {
            debug!(records = batch.len(), "fetched record batch");
        }
        Ok(batch)
    }
}

/// Metadata and records held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    metadata: ProjectMetadata,
    pending: VecDeque<SourceRecord>,
}

impl MemorySource {
    pub fn new(metadata: ProjectMetadata, records: Vec<SourceRecord>) -> Self {
        Self {
            metadata,
            pending: records.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl RecordSource for MemorySource {
    fn metadata(&mut self) -> Result<ProjectMetadata> {
        Ok(self.metadata.clone())
    }

    fn next_batch(&mut self, max_records: usize) -> Result<Option<Vec<SourceRecord>>> {
        Ok(take_batch(&mut self.pending, max_records))
    }
}
