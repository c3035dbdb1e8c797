//! Seeded world/dev splits for the `idiap-search` protocols.
//!
//! One [`StdRng`] is created per [`build`] call from `SearchParams::seed`.
//! Splits are drawn from it one after another: split `n` is the `n`-th
//! permutation of the stream, so reproducing a single split means
//! generating splits `1..=n` with the same seed against the same client
//! order. Client order is catalog insertion order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{search_vis_nir_name, search_vis_vis_name};
use crate::db::{catalog, Database, UnitOfWork};
use crate::error::{Error, Result};
use crate::model::{File, Group, Modality, Purpose};

/// Year whose visible captures are preferred for enrollment.
pub const ENROLL_YEAR: i32 = 2011;
/// Year used for VIS-VIS probes and as the enrollment fallback.
pub const FALLBACK_YEAR: i32 = 2012;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub seed: u64,
    pub num_splits: u32,
    pub world_size: usize,
    pub dev_size: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            seed: 10,
            num_splits: 5,
            world_size: 344,
            dev_size: 230,
        }
    }
}

impl SearchParams {
    fn validate(&self, available_clients: usize) -> Result<()> {
        if self.num_splits == 0 {
            return Err(Error::Configuration("at least one split is required".to_string()));
        }
        let requested = self.world_size.checked_add(self.dev_size).ok_or_else(|| {
            Error::Configuration(format!(
                "world ({}) + dev ({}) clients overflow",
                self.world_size, self.dev_size
            ))
        })?;
        if requested > available_clients {
            return Err(Error::Configuration(format!(
                "world ({}) + dev ({}) = {} clients requested, catalog has {}",
                self.world_size, self.dev_size, requested, available_clients
            )));
        }
        Ok(())
    }
}

/// Clients of one split. World and dev never share a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPartition {
    pub world: Vec<String>,
    pub dev: Vec<String>,
}

/// Draw the next permutation of `client_ids` from `rng` and cut it into
/// `world_size` world clients followed by `dev_size` dev clients.
///
/// Callers must have checked that both groups fit.
pub fn shuffle_split(
    client_ids: &[String],
    rng: &mut StdRng,
    world_size: usize,
    dev_size: usize,
) -> SplitPartition {
    let mut order: Vec<usize> = (0..client_ids.len()).collect();
    order.shuffle(rng);

    let pick = |range: &[usize]| -> Vec<String> {
        range.iter().map(|&i| client_ids[i].clone()).collect()
    };
    SplitPartition {
        world: pick(&order[..world_size]),
        dev: pick(&order[world_size..world_size + dev_size]),
    }
}

/// Enrollment images chosen for a dev client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub files: Vec<File>,
    /// True when no visible image of [`ENROLL_YEAR`] existed.
    pub fallback: bool,
}

/// All visible images of [`ENROLL_YEAR`], or else the first visible image
/// (lowest file id) of [`FALLBACK_YEAR`].
pub fn select_enrollment(conn: &Connection, client_id: &str) -> Result<Enrollment> {
    let preferred = catalog::files_of_client(conn, client_id, Some(Modality::Vis), Some(ENROLL_YEAR))?;
    if !preferred.is_empty() {
        return Ok(Enrollment { files: preferred, fallback: false });
    }

    let first = catalog::files_of_client(conn, client_id, Some(Modality::Vis), Some(FALLBACK_YEAR))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::DataIntegrity(format!(
                "client `{}` has no VIS image from {} or {} to enroll",
                client_id, ENROLL_YEAR, FALLBACK_YEAR
            ))
        })?;

    debug!("Client {} has no {} VIS image, enrolling file {}", client_id, ENROLL_YEAR, first.id);
    Ok(Enrollment { files: vec![first], fallback: true })
}

pub(super) fn build(db: &mut Database, params: &SearchParams, replace: bool) -> Result<Vec<String>> {
    let client_ids = catalog::client_ids(db.conn())?;
    params.validate(client_ids.len())?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut names = Vec::with_capacity(params.num_splits as usize * 2);

    for split in 1..=params.num_splits {
        let partition = shuffle_split(&client_ids, &mut rng, params.world_size, params.dev_size);
        let vis_nir = search_vis_nir_name(split);
        let vis_vis = search_vis_vis_name(split);
        info!("Adding protocols {} and {}", vis_nir, vis_vis);

        let uow = db.begin()?;
        if replace {
            uow.clear_protocol(&vis_nir)?;
            uow.clear_protocol(&vis_vis)?;
        }
        uow.register_protocol(&vis_nir)?;
        uow.register_protocol(&vis_vis)?;
        let fallbacks = write_split(&uow, &vis_nir, &vis_vis, &partition)?;
        uow.commit()?;

        info!(
            "Split {}: {} world clients, {} dev clients, {} enrolled from {}",
            split,
            partition.world.len(),
            partition.dev.len(),
            fallbacks,
            FALLBACK_YEAR
        );
        names.push(vis_nir);
        names.push(vis_vis);
    }

    Ok(names)
}

/// Write both protocols of one split. Returns how many dev clients used the
/// enrollment fallback.
fn write_split(
    uow: &UnitOfWork<'_>,
    vis_nir: &str,
    vis_vis: &str,
    partition: &SplitPartition,
) -> Result<usize> {
    let conn = uow.conn();

    debug!("Group {}", Group::World);
    for client in &partition.world {
        for f in catalog::files_of_client(conn, client, None, None)? {
            uow.assign(vis_nir, Group::World, Purpose::Train, f.id)?;
            if f.modality() == Modality::Vis {
                uow.assign(vis_vis, Group::World, Purpose::Train, f.id)?;
            }
        }
    }

    debug!("Group {}", Group::Dev);
    let mut fallbacks = 0;
    for client in &partition.dev {
        let enrollment = select_enrollment(conn, client)?;
        if enrollment.fallback {
            fallbacks += 1;
        }
        for f in &enrollment.files {
            uow.assign(vis_nir, Group::Dev, Purpose::Enroll, f.id)?;
            uow.assign(vis_vis, Group::Dev, Purpose::Enroll, f.id)?;
        }

        for f in catalog::files_of_client(conn, client, Some(Modality::Thermal), None)? {
            uow.assign(vis_nir, Group::Dev, Purpose::Probe, f.id)?;
        }

        // A fallback enrollment image is a FALLBACK_YEAR image; it keeps its
        // enroll role and is not probed against itself.
        for f in catalog::files_of_client(conn, client, Some(Modality::Vis), Some(FALLBACK_YEAR))? {
            if enrollment.files.iter().any(|e| e.id == f.id) {
                continue;
            }
            uow.assign(vis_vis, Group::Dev, Purpose::Probe, f.id)?;
        }
    }

    Ok(fallbacks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{memory_db, sample_file};
    use crate::protocols::ProtocolBuilder;
    use std::collections::HashSet;

    /// `n` clients `c0..c{n-1}`, each with two VIS 2011, one VIS 2012 and
    /// two THERMAL images. File ids follow insertion order.
    fn population(n: usize) -> Database {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        let mut id = 0;
        for c in 0..n {
            let client = format!("c{}", c);
            uow.insert_client(&client).unwrap();
            let layout = [
                (Modality::Vis, 2011),
                (Modality::Vis, 2011),
                (Modality::Vis, 2012),
                (Modality::Thermal, 2011),
                (Modality::Thermal, 2012),
            ];
            for (modality, year) in layout {
                id += 1;
                uow.insert_file(&sample_file(id, &client, modality, Some(year))).unwrap();
            }
        }
        uow.commit().unwrap();
        db
    }

    fn params(world_size: usize, dev_size: usize) -> SearchParams {
        SearchParams { seed: 10, num_splits: 3, world_size, dev_size }
    }

    #[test]
    fn test_shuffle_split_sizes_and_disjoint() {
        let ids: Vec<String> = (0..600).map(|i| format!("C{}", i)).collect();
        let mut rng = StdRng::seed_from_u64(10);
        let split = shuffle_split(&ids, &mut rng, 344, 230);

        assert_eq!(split.world.len(), 344);
        assert_eq!(split.dev.len(), 230);
        let world: HashSet<_> = split.world.iter().collect();
        let dev: HashSet<_> = split.dev.iter().collect();
        assert!(world.is_disjoint(&dev));
        assert_eq!(world.len() + dev.len(), 574);
    }

    #[test]
    fn test_shuffle_split_is_sequential_stream() {
        let ids: Vec<String> = (0..50).map(|i| format!("C{}", i)).collect();

        let mut a = StdRng::seed_from_u64(10);
        let first_a = shuffle_split(&ids, &mut a, 20, 10);
        let second_a = shuffle_split(&ids, &mut a, 20, 10);

        let mut b = StdRng::seed_from_u64(10);
        let first_b = shuffle_split(&ids, &mut b, 20, 10);
        let second_b = shuffle_split(&ids, &mut b, 20, 10);

        assert_eq!(first_a, first_b);
        assert_eq!(second_a, second_b);
        assert_ne!(first_a, second_a);
    }

    #[test]
    fn test_oversized_groups_rejected() {
        let mut db = population(10);
        let err = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&params(6, 5))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(db.protocol_names().unwrap().is_empty());

        let err = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&SearchParams { num_splits: 0, ..params(2, 2) })
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&params(usize::MAX, 2))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(db.protocol_names().unwrap().is_empty());
    }

    #[test]
    fn test_exact_fit_is_accepted() {
        let mut db = population(10);
        let names = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&params(6, 4))
            .unwrap();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_protocol_names_in_split_order() {
        let mut db = population(8);
        let names = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&SearchParams { num_splits: 2, ..params(4, 3) })
            .unwrap();
        assert_eq!(
            names,
            vec![
                "idiap-search_VIS-NIR_split1",
                "idiap-search_VIS-VIS_split1",
                "idiap-search_VIS-NIR_split2",
                "idiap-search_VIS-VIS_split2",
            ]
        );
    }

    #[test]
    fn test_groups_are_disjoint_with_exact_sizes() {
        let mut db = population(20);
        let names = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&params(8, 5))
            .unwrap();

        for name in &names {
            let world: HashSet<String> =
                db.clients_in(name, Some(Group::World)).unwrap().into_iter().collect();
            let dev: HashSet<String> =
                db.clients_in(name, Some(Group::Dev)).unwrap().into_iter().collect();
            assert_eq!(world.len(), 8, "{}", name);
            assert_eq!(dev.len(), 5, "{}", name);
            assert!(world.is_disjoint(&dev), "{}", name);
        }
    }

    #[test]
    fn test_role_contents() {
        let mut db = population(12);
        ProtocolBuilder::new(&mut db)
            .build_search_protocols(&params(6, 4))
            .unwrap();

        let nir = "idiap-search_VIS-NIR_split1";
        let vis = "idiap-search_VIS-VIS_split1";

        // World trains on everything in VIS-NIR, VIS only in VIS-VIS
        assert_eq!(db.query(nir, Some(Group::World), Some(Purpose::Train), None).unwrap().len(), 6 * 5);
        let vis_train = db.query(vis, Some(Group::World), Some(Purpose::Train), None).unwrap();
        assert_eq!(vis_train.len(), 6 * 3);
        assert!(vis_train.iter().all(|f| f.modality() == Modality::Vis));

        // Every client has 2011 VIS images, so enrollment is exactly those
        for name in [nir, vis] {
            let enroll = db.query(name, Some(Group::Dev), Some(Purpose::Enroll), None).unwrap();
            assert_eq!(enroll.len(), 4 * 2);
            assert!(enroll.iter().all(|f| f.modality() == Modality::Vis && f.year == Some(2011)));
        }

        let dev_clients = db.clients_in(nir, Some(Group::Dev)).unwrap();
        let probes = db.query(nir, Some(Group::Dev), Some(Purpose::Probe), None).unwrap();
        assert_eq!(probes.len(), 4 * 2);
        assert!(probes.iter().all(|f| f.modality() == Modality::Thermal));
        assert!(probes.iter().all(|f| dev_clients.contains(&f.client_id)));

        let vis_probes = db.query(vis, Some(Group::Dev), Some(Purpose::Probe), None).unwrap();
        assert_eq!(vis_probes.len(), 4);
        assert!(vis_probes.iter().all(|f| f.modality() == Modality::Vis && f.year == Some(2012)));
    }

    #[test]
    fn test_rebuild_is_byte_identical() {
        let mut first = population(30);
        let mut second = population(30);
        let p = SearchParams { seed: 10, num_splits: 5, world_size: 15, dev_size: 10 };

        let names = ProtocolBuilder::new(&mut first).build_search_protocols(&p).unwrap();
        ProtocolBuilder::new(&mut second).build_search_protocols(&p).unwrap();

        for name in &names {
            assert_eq!(first.assignments(name).unwrap(), second.assignments(name).unwrap());
            assert_eq!(
                first.assignment_digest(name).unwrap(),
                second.assignment_digest(name).unwrap()
            );
        }

        // Replacing in place reproduces the same rows
        let before: Vec<String> = names.iter().map(|n| first.assignment_digest(n).unwrap()).collect();
        ProtocolBuilder::new(&mut first)
            .replace_existing(true)
            .build_search_protocols(&p)
            .unwrap();
        let after: Vec<String> = names.iter().map(|n| first.assignment_digest(n).unwrap()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_different_seed_changes_partition() {
        let mut a = population(30);
        let mut b = population(30);
        ProtocolBuilder::new(&mut a)
            .build_search_protocols(&SearchParams { seed: 10, ..params(15, 10) })
            .unwrap();
        ProtocolBuilder::new(&mut b)
            .build_search_protocols(&SearchParams { seed: 11, ..params(15, 10) })
            .unwrap();
        let name = "idiap-search_VIS-NIR_split1";
        assert_ne!(
            a.clients_in(name, Some(Group::Dev)).unwrap(),
            b.clients_in(name, Some(Group::Dev)).unwrap()
        );
    }

    #[test]
    fn test_enrollment_fallback_takes_lowest_id() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.insert_client("C42").unwrap();
        uow.insert_file(&sample_file(10, "C42", Modality::Vis, Some(2012))).unwrap();
        uow.insert_file(&sample_file(11, "C42", Modality::Vis, Some(2012))).unwrap();
        uow.insert_file(&sample_file(12, "C42", Modality::Vis, Some(2012))).unwrap();
        uow.insert_file(&sample_file(13, "C42", Modality::Thermal, Some(2012))).unwrap();
        uow.commit().unwrap();

        let enrollment = select_enrollment(db.conn(), "C42").unwrap();
        assert!(enrollment.fallback);
        assert_eq!(enrollment.files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![10]);

        ProtocolBuilder::new(&mut db)
            .build_search_protocols(&SearchParams { seed: 10, num_splits: 1, world_size: 0, dev_size: 1 })
            .unwrap();
        for name in ["idiap-search_VIS-NIR_split1", "idiap-search_VIS-VIS_split1"] {
            let enroll = db.query(name, Some(Group::Dev), Some(Purpose::Enroll), None).unwrap();
            assert_eq!(enroll.iter().map(|f| f.id).collect::<Vec<_>>(), vec![10]);
        }
        let vis_probes = db
            .query("idiap-search_VIS-VIS_split1", Some(Group::Dev), Some(Purpose::Probe), None)
            .unwrap();
        assert_eq!(vis_probes.iter().map(|f| f.id).collect::<Vec<_>>(), vec![11, 12]);
    }

    #[test]
    fn test_enrollment_prefers_2011() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.insert_client("c1").unwrap();
        uow.insert_file(&sample_file(1, "c1", Modality::Vis, Some(2012))).unwrap();
        uow.insert_file(&sample_file(2, "c1", Modality::Vis, Some(2011))).unwrap();
        uow.insert_file(&sample_file(3, "c1", Modality::Vis, Some(2011))).unwrap();
        uow.commit().unwrap();

        let enrollment = select_enrollment(db.conn(), "c1").unwrap();
        assert!(!enrollment.fallback);
        assert_eq!(enrollment.files.iter().map(|f| f.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_client_without_vis_is_fatal() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.insert_client("c1").unwrap();
        uow.insert_file(&sample_file(1, "c1", Modality::Thermal, Some(2011))).unwrap();
        uow.commit().unwrap();

        let err = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&SearchParams { seed: 10, num_splits: 1, world_size: 0, dev_size: 1 })
            .unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        // The failing split was rolled back as a unit
        assert!(db.protocol_names().unwrap().is_empty());
    }

    #[test]
    fn test_failed_split_keeps_earlier_splits() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        let mut id = 0;
        for c in 0..6 {
            let client = format!("c{}", c);
            uow.insert_client(&client).unwrap();
            // c0 has nothing to enroll
            let layout: &[(Modality, i32)] = if c == 0 {
                &[(Modality::Thermal, 2011), (Modality::Thermal, 2012)]
            } else {
                &[(Modality::Vis, 2011), (Modality::Vis, 2012), (Modality::Thermal, 2012)]
            };
            for &(modality, year) in layout {
                id += 1;
                uow.insert_file(&sample_file(id, &client, modality, Some(year))).unwrap();
            }
        }
        uow.commit().unwrap();

        // Pick a seed whose first split with c0 in dev is not the first split
        let client_ids = db.client_ids().unwrap();
        let num_splits = 20;
        let first_failing = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (1..=num_splits).find(|_| {
                shuffle_split(&client_ids, &mut rng, 2, 2).dev.iter().any(|c| c == "c0")
            })
        };
        let (seed, failing) = (0..1000u64)
            .find_map(|seed| first_failing(seed).filter(|&k| k > 1).map(|k| (seed, k)))
            .unwrap();

        let err = ProtocolBuilder::new(&mut db)
            .build_search_protocols(&SearchParams { seed, num_splits, world_size: 2, dev_size: 2 })
            .unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));

        let names = db.protocol_names().unwrap();
        assert_eq!(names.len(), 2 * (failing as usize - 1));
        for split in 1..failing {
            assert!(names.contains(&search_vis_nir_name(split)));
            assert!(names.contains(&search_vis_vis_name(split)));
            assert!(db.protocol_summary(&search_vis_nir_name(split)).unwrap().total() > 0);
        }
        assert!(!db.protocol_exists(&search_vis_nir_name(failing)).unwrap());
        assert!(!db.protocol_exists(&search_vis_vis_name(failing)).unwrap());
    }

    #[test]
    fn test_rebuild_without_replace_keeps_rows() {
        let mut db = population(12);
        let p = params(6, 4);
        let names = ProtocolBuilder::new(&mut db).build_search_protocols(&p).unwrap();
        let before: Vec<String> = names.iter().map(|n| db.assignment_digest(n).unwrap()).collect();

        let err = ProtocolBuilder::new(&mut db).build_search_protocols(&p).unwrap_err();
        assert!(matches!(err, Error::DuplicateAssignment { .. }));

        let after: Vec<String> = names.iter().map(|n| db.assignment_digest(n).unwrap()).collect();
        assert_eq!(before, after);
        assert_eq!(db.protocol_names().unwrap().len(), names.len());
    }
}
