//! Protocol/file association rows and the read-only protocol queries.

use rusqlite::{params, params_from_iter, types::Value, Connection, ErrorCode};
use sha2::{Digest, Sha256};

use super::catalog::{collect_files, FILE_COLUMNS};
use crate::error::{Error, Result};
use crate::model::{File, Group, ProtocolAssignment, Purpose};

/// Filters for [`query_files`]. `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct FileQuery<'a> {
    pub group: Option<Group>,
    pub purpose: Option<Purpose>,
    pub client_ids: Option<&'a [String]>,
}

/// Row counts of one protocol, per (group, purpose).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSummary {
    pub protocol: String,
    pub counts: Vec<(Group, Purpose, i64)>,
    pub clients: i64,
}

impl ProtocolSummary {
    pub fn total(&self) -> i64 {
        self.counts.iter().map(|(_, _, n)| n).sum()
    }
}

/// Record `protocol` as built. A protocol exists from this point even if no
/// file is ever assigned to it.
pub(crate) fn register_protocol(conn: &Connection, protocol: &str) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO protocol (name) VALUES (?1)", [protocol])?;
    Ok(())
}

pub(crate) fn assign(
    conn: &Connection,
    protocol: &str,
    group: Group,
    purpose: Purpose,
    file_id: i64,
) -> Result<()> {
    register_protocol(conn, protocol)?;
    let result = conn.execute(
        "INSERT INTO protocol_file (protocol, sgroup, purpose, file_id) VALUES (?1, ?2, ?3, ?4)",
        params![protocol, group.as_str(), purpose.as_str(), file_id],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                Err(Error::DataIntegrity(format!(
                    "protocol `{}` references missing file {}",
                    protocol, file_id
                )))
            } else {
                Err(Error::DuplicateAssignment { protocol: protocol.to_string(), file_id })
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove the assignment rows of `protocol` and its registration. Returns
/// the number of assignment rows removed.
pub(crate) fn clear_protocol(conn: &Connection, protocol: &str) -> Result<usize> {
    let removed = conn.execute("DELETE FROM protocol_file WHERE protocol = ?1", [protocol])?;
    conn.execute("DELETE FROM protocol WHERE name = ?1", [protocol])?;
    Ok(removed)
}

pub(crate) fn protocol_exists(conn: &Connection, protocol: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM protocol WHERE name = ?1)",
        [protocol],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn protocol_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM protocol ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

pub(crate) fn groups(conn: &Connection, protocol: &str) -> Result<Vec<Group>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT sgroup FROM protocol_file WHERE protocol = ?1")?;
    let names = stmt
        .query_map([protocol], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut groups = names.iter().map(|g| g.parse()).collect::<Result<Vec<Group>>>()?;
    groups.sort();
    Ok(groups)
}

/// Files assigned in `protocol` that match every supplied filter, ordered by file id.
pub(crate) fn query_files(
    conn: &Connection,
    protocol: &str,
    filter: &FileQuery<'_>,
) -> Result<Vec<File>> {
    let mut sql = format!(
        r#"
        SELECT DISTINCT {}
        FROM file f
        JOIN protocol_file pf ON pf.file_id = f.id
        WHERE pf.protocol = ?
        "#,
        FILE_COLUMNS
    );
    let mut values: Vec<Value> = vec![Value::Text(protocol.to_string())];

    if let Some(group) = filter.group {
        sql.push_str(" AND pf.sgroup = ?");
        values.push(Value::Text(group.as_str().to_string()));
    }
    if let Some(purpose) = filter.purpose {
        sql.push_str(" AND pf.purpose = ?");
        values.push(Value::Text(purpose.as_str().to_string()));
    }
    if let Some(client_ids) = filter.client_ids {
        if client_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; client_ids.len()].join(", ");
        sql.push_str(&format!(" AND f.client_id IN ({})", placeholders));
        values.extend(client_ids.iter().map(|c| Value::Text(c.clone())));
    }
    sql.push_str(" ORDER BY f.id");

    collect_files(conn, &sql, params_from_iter(values))
}

/// Distinct clients of a protocol, optionally restricted to a group and purpose,
/// in client insertion order.
pub(crate) fn clients_in(
    conn: &Connection,
    protocol: &str,
    group: Option<Group>,
    purpose: Option<Purpose>,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.id
        FROM client c
        WHERE EXISTS (
            SELECT 1
            FROM protocol_file pf
            JOIN file f ON f.id = pf.file_id
            WHERE f.client_id = c.id
              AND pf.protocol = ?1
              AND (?2 IS NULL OR pf.sgroup = ?2)
              AND (?3 IS NULL OR pf.purpose = ?3)
        )
        ORDER BY c.rowid
        "#,
    )?;
    let ids = stmt
        .query_map(
            params![protocol, group.map(|g| g.as_str()), purpose.map(|p| p.as_str())],
            |row| row.get(0),
        )?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// Every assignment row of a protocol in a stable order.
pub(crate) fn assignments(conn: &Connection, protocol: &str) -> Result<Vec<ProtocolAssignment>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT protocol, sgroup, purpose, file_id
        FROM protocol_file
        WHERE protocol = ?1
        ORDER BY sgroup, purpose, file_id
        "#,
    )?;
    let rows = stmt
        .query_map([protocol], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(protocol, group, purpose, file_id)| -> Result<ProtocolAssignment> {
            Ok(ProtocolAssignment {
                protocol,
                group: group.parse()?,
                purpose: purpose.parse()?,
                file_id,
            })
        })
        .collect()
}

/// SHA-256 over the ordered assignment rows, hex encoded.
pub(crate) fn assignment_digest(conn: &Connection, protocol: &str) -> Result<String> {
    let mut hasher = Sha256::new();
    for row in assignments(conn, protocol)? {
        hasher.update(
            format!("{}\t{}\t{}\t{}\n", row.protocol, row.group, row.purpose, row.file_id)
                .as_bytes(),
        );
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

pub(crate) fn summary(conn: &Connection, protocol: &str) -> Result<ProtocolSummary> {
    let mut stmt = conn.prepare(
        r#"
        SELECT sgroup, purpose, COUNT(*)
        FROM protocol_file
        WHERE protocol = ?1
        GROUP BY sgroup, purpose
        "#,
    )?;
    let rows = stmt
        .query_map([protocol], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut counts = rows
        .into_iter()
        .map(|(g, p, n)| -> Result<(Group, Purpose, i64)> { Ok((g.parse()?, p.parse()?, n)) })
        .collect::<Result<Vec<_>>>()?;
    counts.sort();

    let clients = clients_in(conn, protocol, None, None)?.len() as i64;
    Ok(ProtocolSummary { protocol: protocol.to_string(), counts, clients })
}
