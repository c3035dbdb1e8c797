pub mod discovery;
pub mod metadata;

use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;
use crate::db::{catalog, Database};
use crate::error::Result;
use crate::model::{Annotation, File};

pub use discovery::discover_images;
pub use metadata::{parse_file_name, year_from_path, FileMetadata};

/// Counts from one ingestion pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub found: usize,
    pub clients_added: usize,
    pub files_added: usize,
    /// Files with an excluded polarization
    pub excluded: usize,
    /// Files whose name could not be parsed
    pub skipped: usize,
    /// Files already in the catalog
    pub existing: usize,
}

pub struct Scanner {
    config: DatasetConfig,
}

impl Scanner {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    /// Walk every configured directory and add its images to the catalog in
    /// one unit of work. New clients are added the first time they are seen;
    /// file ids continue from the largest id in the catalog.
    pub fn scan(&self, db: &mut Database) -> Result<ScanReport> {
        let root = &self.config.image_dir;
        let landmarks = self.config.landmarks;
        let mut report = ScanReport::default();
        let mut seen_clients = HashSet::new();

        let uow = db.begin()?;
        let mut next_id = uow.next_file_id()?;

        for directory in &self.config.directories {
            let dir_path = root.join(directory);
            info!("Scanning {}", dir_path.display());
            let images = discover_images(&dir_path, &self.config.image_extensions)?;
            report.found += images.len();

            for path in images {
                let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                    continue;
                };

                let meta = match parse_file_name(&stem) {
                    Ok(meta) => meta,
                    Err(e) => {
                        warn!("Skipping {}: {}", path.display(), e);
                        report.skipped += 1;
                        continue;
                    }
                };

                let polarization = meta.capture.polarization().as_str();
                if self.config.excluded_polarizations.iter().any(|p| p == polarization) {
                    report.excluded += 1;
                    continue;
                }

                let relative = storage_path(root, &path);
                if catalog::file_id_by_path(uow.conn(), &relative)?.is_some() {
                    report.existing += 1;
                    continue;
                }

                if seen_clients.insert(meta.client_id.clone()) && !uow.client_exists(&meta.client_id)? {
                    debug!("Adding client {}", meta.client_id);
                    uow.insert_client(&meta.client_id)?;
                    report.clients_added += 1;
                }

                let file = File {
                    id: next_id,
                    client_id: meta.client_id,
                    image_name: stem,
                    year: path.strip_prefix(root).ok().and_then(year_from_path),
                    path: relative,
                    capture: meta.capture,
                    capture_range: meta.capture_range,
                    condition: meta.condition,
                    shot: meta.shot,
                };
                debug!("Adding file {}", file.image_name);
                uow.insert_file(&file)?;
                uow.insert_annotation(&Annotation {
                    file_id: file.id,
                    re_x: landmarks.right_eye.0,
                    re_y: landmarks.right_eye.1,
                    le_x: landmarks.left_eye.0,
                    le_y: landmarks.left_eye.1,
                })?;
                next_id += 1;
                report.files_added += 1;
            }
        }

        uow.commit()?;
        info!(
            "Scan complete: {} found, {} clients and {} files added, {} excluded, {} skipped",
            report.found, report.clients_added, report.files_added, report.excluded, report.skipped
        );
        Ok(report)
    }
}

/// Path of `path` relative to `root`, without extension, `/`-separated.
fn storage_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
