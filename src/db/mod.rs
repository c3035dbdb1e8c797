mod schema;
pub(crate) mod catalog;
pub(crate) mod protocols;

use rusqlite::{Connection, Transaction};
use std::path::Path;

pub use protocols::{FileQuery, ProtocolSummary};
pub use schema::SCHEMA;

use crate::error::{Error, Result};
use crate::model::{Annotation, Client, File, Group, ProtocolAssignment, Purpose};

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the catalog file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    /// In-memory catalog, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a unit of work. Nothing it writes is visible until
    /// [`UnitOfWork::commit`]; dropping it rolls back.
    pub fn begin(&mut self) -> Result<UnitOfWork<'_>> {
        Ok(UnitOfWork { tx: self.conn.transaction()? })
    }

    // ========================================================================
    // Catalog records
    // ========================================================================

    pub fn clients(&self) -> Result<Vec<Client>> {
        catalog::clients(&self.conn)
    }

    pub fn client_ids(&self) -> Result<Vec<String>> {
        catalog::client_ids(&self.conn)
    }

    pub fn file(&self, id: i64) -> Result<Option<File>> {
        catalog::file(&self.conn, id)
    }

    pub fn annotation(&self, file_id: i64) -> Result<Option<Annotation>> {
        catalog::annotation(&self.conn, file_id)
    }

    pub fn count_clients(&self) -> Result<i64> {
        catalog::count(&self.conn, "client")
    }

    pub fn count_files(&self) -> Result<i64> {
        catalog::count(&self.conn, "file")
    }

    // ========================================================================
    // Protocol queries
    // ========================================================================

    /// Files of `protocol` matching the optional group, purpose and client filters.
    /// An unknown protocol yields an empty list.
    pub fn query(
        &self,
        protocol: &str,
        group: Option<Group>,
        purpose: Option<Purpose>,
        client_ids: Option<&[String]>,
    ) -> Result<Vec<File>> {
        let filter = FileQuery { group, purpose, client_ids };
        protocols::query_files(&self.conn, protocol, &filter)
    }

    /// Like [`Database::query`] but an unknown protocol is an error.
    pub fn query_checked(
        &self,
        protocol: &str,
        group: Option<Group>,
        purpose: Option<Purpose>,
        client_ids: Option<&[String]>,
    ) -> Result<Vec<File>> {
        if !self.protocol_exists(protocol)? {
            return Err(Error::UnknownProtocol(protocol.to_string()));
        }
        self.query(protocol, group, purpose, client_ids)
    }

    pub fn protocol_exists(&self, protocol: &str) -> Result<bool> {
        protocols::protocol_exists(&self.conn, protocol)
    }

    pub fn protocol_names(&self) -> Result<Vec<String>> {
        protocols::protocol_names(&self.conn)
    }

    pub fn groups(&self, protocol: &str) -> Result<Vec<Group>> {
        protocols::groups(&self.conn, protocol)
    }

    /// Clients enrolled in `protocol`/`group`; each one is a model.
    pub fn model_ids(&self, protocol: &str, group: Group) -> Result<Vec<String>> {
        protocols::clients_in(&self.conn, protocol, Some(group), Some(Purpose::Enroll))
    }

    pub fn clients_in(&self, protocol: &str, group: Option<Group>) -> Result<Vec<String>> {
        protocols::clients_in(&self.conn, protocol, group, None)
    }

    pub fn assignments(&self, protocol: &str) -> Result<Vec<ProtocolAssignment>> {
        protocols::assignments(&self.conn, protocol)
    }

    pub fn assignment_digest(&self, protocol: &str) -> Result<String> {
        protocols::assignment_digest(&self.conn, protocol)
    }

    pub fn protocol_summary(&self, protocol: &str) -> Result<ProtocolSummary> {
        protocols::summary(&self.conn, protocol)
    }

    /// Remove every assignment row of `protocol`.
    pub fn clear_protocol(&mut self, protocol: &str) -> Result<usize> {
        let uow = self.begin()?;
        let removed = uow.clear_protocol(protocol)?;
        uow.commit()?;
        Ok(removed)
    }
}

/// Transaction scoped to one ingestion or one protocol build.
pub struct UnitOfWork<'db> {
    tx: Transaction<'db>,
}

impl UnitOfWork<'_> {
    pub(crate) fn conn(&self) -> &Connection {
        &self.tx
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn insert_client(&self, id: &str) -> Result<()> {
        catalog::insert_client(&self.tx, id)
    }

    pub fn client_exists(&self, id: &str) -> Result<bool> {
        catalog::client_exists(&self.tx, id)
    }

    pub fn next_file_id(&self) -> Result<i64> {
        catalog::next_file_id(&self.tx)
    }

    pub fn insert_file(&self, file: &File) -> Result<()> {
        catalog::insert_file(&self.tx, file)
    }

    pub fn insert_annotation(&self, annotation: &Annotation) -> Result<()> {
        catalog::insert_annotation(&self.tx, annotation)
    }

    pub fn register_protocol(&self, protocol: &str) -> Result<()> {
        protocols::register_protocol(&self.tx, protocol)
    }

    pub fn assign(&self, protocol: &str, group: Group, purpose: Purpose, file_id: i64) -> Result<()> {
        protocols::assign(&self.tx, protocol, group, purpose, file_id)
    }

    pub fn clear_protocol(&self, protocol: &str) -> Result<usize> {
        protocols::clear_protocol(&self.tx, protocol)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Capture, Condition, Modality, Polarization};

    /// Build a file record for tests.
    pub(crate) fn sample_file(id: i64, client: &str, modality: Modality, year: Option<i32>) -> File {
        let polarization = match modality {
            Modality::Vis => Polarization::NotApplicable,
            Modality::Thermal => Polarization::S0,
        };
        File {
            id,
            client_id: client.to_string(),
            image_name: format!("{}_{}", client, id),
            path: format!("{}/{}_{}", modality.as_str(), client, id),
            capture: Capture::new(modality, polarization).unwrap(),
            capture_range: "R1".to_string(),
            condition: Condition::Baseline,
            shot: 1,
            year,
        }
    }

    pub(crate) fn memory_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_client_order_is_insertion_order() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        for id in ["z9", "a1", "m5"] {
            uow.insert_client(id).unwrap();
        }
        uow.commit().unwrap();

        assert_eq!(db.client_ids().unwrap(), vec!["z9", "a1", "m5"]);
        assert!(db.clients().unwrap().iter().all(|c| c.group == Group::World));
    }

    #[test]
    fn test_file_requires_client() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        let err = uow
            .insert_file(&sample_file(1, "ghost", Modality::Vis, Some(2011)))
            .unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
    }

    #[test]
    fn test_rollback_on_drop() {
        let mut db = memory_db();
        {
            let uow = db.begin().unwrap();
            uow.insert_client("c1").unwrap();
        }
        assert_eq!(db.count_clients().unwrap(), 0);
    }

    #[test]
    fn test_duplicate_assignment_rejected() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.insert_client("c1").unwrap();
        uow.insert_file(&sample_file(1, "c1", Modality::Vis, Some(2011))).unwrap();
        uow.assign("p", Group::Dev, Purpose::Enroll, 1).unwrap();
        let err = uow.assign("p", Group::Dev, Purpose::Probe, 1).unwrap_err();
        assert!(matches!(err, Error::DuplicateAssignment { file_id: 1, .. }));

        // Same file in another protocol is fine
        uow.assign("q", Group::Dev, Purpose::Probe, 1).unwrap();
    }

    #[test]
    fn test_assignment_to_missing_file() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        let err = uow.assign("p", Group::Eval, Purpose::Probe, 42).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
    }

    #[test]
    fn test_query_filters() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.insert_client("c1").unwrap();
        uow.insert_client("c2").unwrap();
        uow.insert_file(&sample_file(1, "c1", Modality::Vis, Some(2011))).unwrap();
        uow.insert_file(&sample_file(2, "c1", Modality::Thermal, Some(2012))).unwrap();
        uow.insert_file(&sample_file(3, "c2", Modality::Thermal, Some(2012))).unwrap();
        uow.assign("p", Group::Dev, Purpose::Enroll, 1).unwrap();
        uow.assign("p", Group::Dev, Purpose::Probe, 2).unwrap();
        uow.assign("p", Group::Dev, Purpose::Probe, 3).unwrap();
        uow.commit().unwrap();

        assert_eq!(db.query("p", None, None, None).unwrap().len(), 3);
        let probes = db.query("p", Some(Group::Dev), Some(Purpose::Probe), None).unwrap();
        assert_eq!(probes.iter().map(|f| f.id).collect::<Vec<_>>(), vec![2, 3]);

        let only_c2 = vec!["c2".to_string()];
        let probes = db.query("p", None, Some(Purpose::Probe), Some(only_c2.as_slice())).unwrap();
        assert_eq!(probes.len(), 1);
        assert_eq!(probes[0].client_id, "c2");

        assert!(db.query("p", Some(Group::World), None, None).unwrap().is_empty());
        assert!(db.query("missing", None, None, None).unwrap().is_empty());
        assert!(db.protocol_exists("p").unwrap());
        assert!(!db.protocol_exists("missing").unwrap());
        assert!(db.query_checked("missing", None, None, None).unwrap_err().is_configuration());

        assert_eq!(db.model_ids("p", Group::Dev).unwrap(), vec!["c1"]);
        assert_eq!(db.clients_in("p", Some(Group::Dev)).unwrap(), vec!["c1", "c2"]);
        assert_eq!(db.groups("p").unwrap(), vec![Group::Dev]);

        let summary = db.protocol_summary("p").unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.clients, 2);
    }

    #[test]
    fn test_clear_protocol() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.insert_client("c1").unwrap();
        uow.insert_file(&sample_file(1, "c1", Modality::Vis, Some(2011))).unwrap();
        uow.assign("p", Group::Eval, Purpose::Enroll, 1).unwrap();
        uow.commit().unwrap();

        assert_eq!(db.clear_protocol("p").unwrap(), 1);
        assert!(!db.protocol_exists("p").unwrap());
        assert!(db.protocol_names().unwrap().is_empty());
    }

    #[test]
    fn test_registered_protocol_without_rows_exists() {
        let mut db = memory_db();
        let uow = db.begin().unwrap();
        uow.register_protocol("empty").unwrap();
        uow.commit().unwrap();

        assert!(db.protocol_exists("empty").unwrap());
        assert_eq!(db.protocol_names().unwrap(), vec!["empty"]);
        assert!(db.query_checked("empty", None, None, None).unwrap().is_empty());
        assert!(db.query_checked("other", None, None, None).is_err());
    }
}
