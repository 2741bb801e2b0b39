//! Link persistence
//!
//! Links are written as one JSON document. Each record carries every
//! [`PredictedLink`] field verbatim next to its relationship view, so the file
//! is readable by downstream join-path builders and re-hydrates bit-identically.

use crate::error::{LinkError, Result};
use crate::link::{PredictedLink, RelationshipTable, RelationshipType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDocument {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub relationships: Vec<RelationshipRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub source: RelationshipTable,
    pub target: RelationshipTable,
    #[serde(flatten)]
    pub link: PredictedLink,
}

impl RelationshipRecord {
    pub fn new(link: &PredictedLink, cardinality_threshold: f64) -> Self {
        let rel = link.relationship_with(cardinality_threshold);
        Self {
            name: rel.name,
            kind: rel.kind,
            source: rel.source,
            target: rel.target,
            link: link.clone(),
        }
    }
}

impl LinkDocument {
    pub fn new(links: &[PredictedLink], cardinality_threshold: f64) -> Self {
        Self {
            version: FORMAT_VERSION,
            generated_at: Utc::now(),
            relationships: links
                .iter()
                .map(|l| RelationshipRecord::new(l, cardinality_threshold))
                .collect(),
        }
    }

    pub fn into_links(self) -> Vec<PredictedLink> {
        self.relationships.into_iter().map(|r| r.link).collect()
    }
}

/// Write `links` to `path` atomically: readers see the old file or the new
/// one, never a partial write.
pub fn save_links(path: &Path, links: &[PredictedLink], cardinality_threshold: f64) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let document = LinkDocument::new(links, cardinality_threshold);
    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(&temp_file);
        serde_json::to_writer_pretty(&mut writer, &document)
            .map_err(|e| LinkError::Serialization(format!("Failed to encode links: {}", e)))?;
        writer.flush()?;
    }
    temp_file.persist(path).map_err(|e| LinkError::Io(e.error))?;

    info!(path = %path.display(), links = links.len(), "Saved links");
    Ok(())
}

pub fn load_document(path: &Path) -> Result<LinkDocument> {
    let reader = BufReader::new(File::open(path)?);
    let document: LinkDocument = serde_json::from_reader(reader)
        .map_err(|e| LinkError::Serialization(format!("Failed to decode {}: {}", path.display(), e)))?;
    if document.version > FORMAT_VERSION {
        return Err(LinkError::Serialization(format!(
            "{} has format version {}, newest supported is {}",
            path.display(),
            document.version,
            FORMAT_VERSION
        )));
    }
    Ok(document)
}

pub fn load_links(path: &Path) -> Result<Vec<PredictedLink>> {
    Ok(load_document(path)?.into_links())
}
