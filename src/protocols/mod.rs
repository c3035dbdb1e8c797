//! Evaluation protocol construction.
//!
//! Two families of protocols are built from the catalog:
//!
//! - `original_{gallery}-{probe}`: every visible image of the gallery year is
//!   enrolled and every thermal image of the probe year is a probe, all in
//!   the `eval` group.
//! - `idiap-search_VIS-NIR_split{n}` / `idiap-search_VIS-VIS_split{n}`: the
//!   client population is shuffled with a seeded generator and cut into a
//!   `world` (training) and a `dev` group per split. See [`search`].
//!
//! Each protocol build runs inside its own [`UnitOfWork`]: a failure rolls
//! back only the protocol being built.

pub mod search;

use tracing::{debug, info};

use crate::db::{catalog, Database, UnitOfWork};
use crate::error::Result;
use crate::model::{Group, Modality, Purpose};

pub use search::{select_enrollment, shuffle_split, Enrollment, SearchParams, SplitPartition};

/// (gallery year, probe year) pairs of the original protocols.
pub const ORIGINAL_YEAR_PAIRS: [(i32, i32); 2] = [(2011, 2012), (2012, 2011)];

pub fn original_protocol_name(gallery_year: i32, probe_year: i32) -> String {
    format!("original_{}-{}", gallery_year, probe_year)
}

pub fn search_vis_nir_name(split: u32) -> String {
    format!("idiap-search_VIS-NIR_split{}", split)
}

pub fn search_vis_vis_name(split: u32) -> String {
    format!("idiap-search_VIS-VIS_split{}", split)
}

/// Writes protocol assignment rows into a catalog.
///
/// Building a protocol that already has rows fails with a duplicate
/// assignment error unless [`ProtocolBuilder::replace_existing`] is set, in
/// which case the old rows are removed in the same unit of work.
pub struct ProtocolBuilder<'db> {
    db: &'db mut Database,
    replace: bool,
}

impl<'db> ProtocolBuilder<'db> {
    pub fn new(db: &'db mut Database) -> Self {
        Self { db, replace: false }
    }

    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Build `original_{gallery_year}-{probe_year}`.
    pub fn build_fixed_year_protocol(&mut self, gallery_year: i32, probe_year: i32) -> Result<String> {
        let protocol = original_protocol_name(gallery_year, probe_year);
        info!("Adding protocol {}", protocol);

        let uow = self.db.begin()?;
        if self.replace {
            uow.clear_protocol(&protocol)?;
        }
        uow.register_protocol(&protocol)?;
        let (enrolled, probes) = assign_fixed_year(&uow, &protocol, gallery_year, probe_year)?;
        uow.commit()?;

        info!("Protocol {}: {} enroll, {} probe files", protocol, enrolled, probes);
        Ok(protocol)
    }

    /// Build one fixed-year protocol per (gallery, probe) pair.
    pub fn build_original_protocols(&mut self, year_pairs: &[(i32, i32)]) -> Result<Vec<String>> {
        year_pairs
            .iter()
            .map(|&(gallery, probe)| self.build_fixed_year_protocol(gallery, probe))
            .collect()
    }

    /// Build the VIS-NIR and VIS-VIS search protocols for every split.
    ///
    /// Returns the protocol names in split order, VIS-NIR before VIS-VIS.
    pub fn build_search_protocols(&mut self, params: &SearchParams) -> Result<Vec<String>> {
        search::build(&mut *self.db, params, self.replace)
    }
}

fn assign_fixed_year(
    uow: &UnitOfWork<'_>,
    protocol: &str,
    gallery_year: i32,
    probe_year: i32,
) -> Result<(usize, usize)> {
    let gallery = catalog::files_by_modality_year(uow.conn(), Modality::Vis, gallery_year)?;
    for f in &gallery {
        uow.assign(protocol, Group::Eval, Purpose::Enroll, f.id)?;
    }

    let probes = catalog::files_by_modality_year(uow.conn(), Modality::Thermal, probe_year)?;
    for f in &probes {
        uow.assign(protocol, Group::Eval, Purpose::Probe, f.id)?;
    }

    debug!(
        "{}: VIS {} gallery, THERMAL {} probes",
        protocol, gallery_year, probe_year
    );
    Ok((gallery.len(), probes.len()))
}
