use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File as FsFile;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::model::{Group, Purpose};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Which files to list: one protocol group, some or all of its models.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub protocol: String,
    pub group: Group,
    /// Empty means every model of the group
    pub models: Vec<String>,
    /// Prefix for the resolved image paths
    pub directory: String,
    /// Image extension, including the dot
    pub extension: String,
}

/// One enroll or probe image of a model
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub model_id: String,
    pub purpose: Purpose,
    pub file_id: i64,
    pub image_name: String,
    pub modality: String,
    pub polarization: String,
    pub year: Option<i32>,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct Manifest {
    pub protocol: String,
    pub group: Group,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
}

/// Enroll and probe images of each requested model. Probe images are limited
/// to the model's own client.
pub fn collect_manifest(db: &Database, request: &ExportRequest) -> Result<Manifest> {
    if !db.protocol_exists(&request.protocol)? {
        return Err(Error::UnknownProtocol(request.protocol.clone()));
    }

    let models = if request.models.is_empty() {
        db.model_ids(&request.protocol, request.group)?
    } else {
        request.models.clone()
    };

    let mut entries = Vec::new();
    for model in &models {
        let clients = std::slice::from_ref(model);
        for purpose in [Purpose::Enroll, Purpose::Probe] {
            let files =
                db.query(&request.protocol, Some(request.group), Some(purpose), Some(clients))?;
            entries.extend(files.into_iter().map(|f| ManifestEntry {
                model_id: model.clone(),
                purpose,
                file_id: f.id,
                path: f.make_path(&request.directory, &request.extension),
                image_name: f.image_name,
                modality: f.capture.modality().to_string(),
                polarization: f.capture.polarization().to_string(),
                year: f.year,
            }));
        }
    }

    Ok(Manifest {
        protocol: request.protocol.clone(),
        group: request.group,
        generated_at: Utc::now(),
        entries,
    })
}

/// Write the manifest for `request` to `output_path`. Returns the entry count.
pub fn export_models(
    db: &Database,
    request: &ExportRequest,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let manifest = collect_manifest(db, request)?;
    let count = manifest.entries.len();

    match format {
        ExportFormat::Json => export_json(&manifest, output_path)?,
        ExportFormat::Csv => export_csv(&manifest.entries, output_path)?,
    }

    info!(
        "Exported {} entries of {}/{} to {}",
        count,
        request.protocol,
        request.group,
        output_path.display()
    );
    Ok(count)
}

fn export_json(manifest: &Manifest, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    let mut file = FsFile::create(output_path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(entries: &[ManifestEntry], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record([
        "model_id",
        "purpose",
        "file_id",
        "image_name",
        "modality",
        "polarization",
        "year",
        "path",
    ])?;

    for entry in entries {
        let file_id = entry.file_id.to_string();
        let year = entry.year.map(|y| y.to_string()).unwrap_or_default();
        wtr.write_record([
            entry.model_id.as_str(),
            entry.purpose.as_str(),
            file_id.as_str(),
            entry.image_name.as_str(),
            entry.modality.as_str(),
            entry.polarization.as_str(),
            year.as_str(),
            entry.path.as_str(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
