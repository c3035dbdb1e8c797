//! Client, file and annotation records.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::model::{Annotation, Capture, Client, File, Group, Modality};

pub(crate) const FILE_COLUMNS: &str =
    "f.id, f.client_id, f.image_name, f.path, f.modality, f.polarization, \
     f.capture_range, f.condition, f.shot, f.year";

/// A file row as stored; converted to [`File`] once the text columns are validated.
pub(crate) struct FileRow {
    id: i64,
    client_id: String,
    image_name: String,
    path: String,
    modality: String,
    polarization: String,
    capture_range: String,
    condition: String,
    shot: i64,
    year: Option<i32>,
}

impl FileRow {
    pub(crate) fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            client_id: row.get(1)?,
            image_name: row.get(2)?,
            path: row.get(3)?,
            modality: row.get(4)?,
            polarization: row.get(5)?,
            capture_range: row.get(6)?,
            condition: row.get(7)?,
            shot: row.get(8)?,
            year: row.get(9)?,
        })
    }

    pub(crate) fn into_file(self) -> Result<File> {
        let capture = Capture::new(self.modality.parse()?, self.polarization.parse()?)
            .map_err(|e| Error::DataIntegrity(format!("file {}: {}", self.id, e)))?;
        Ok(File {
            id: self.id,
            client_id: self.client_id,
            image_name: self.image_name,
            path: self.path,
            capture,
            capture_range: self.capture_range,
            condition: self.condition.parse()?,
            shot: self.shot,
            year: self.year,
        })
    }
}

/// Run a file query and convert every row.
pub(crate) fn collect_files(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<File>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, FileRow::read)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(FileRow::into_file).collect()
}

pub(crate) fn insert_client(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO client (id, sgroup) VALUES (?1, ?2)",
        params![id, Group::World.as_str()],
    )?;
    Ok(())
}

pub(crate) fn client_exists(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM client WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Insert a file with an explicit id. The owning client must already exist.
pub(crate) fn insert_file(conn: &Connection, file: &File) -> Result<()> {
    if !client_exists(conn, &file.client_id)? {
        return Err(Error::DataIntegrity(format!(
            "file `{}` references unknown client `{}`",
            file.image_name, file.client_id
        )));
    }
    conn.execute(
        r#"
        INSERT INTO file (id, client_id, image_name, path, modality, polarization,
                          capture_range, condition, shot, year)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            file.id,
            file.client_id,
            file.image_name,
            file.path,
            file.modality().as_str(),
            file.polarization().as_str(),
            file.capture_range,
            file.condition.as_str(),
            file.shot,
            file.year,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_annotation(conn: &Connection, annotation: &Annotation) -> Result<()> {
    conn.execute(
        "INSERT INTO annotation (file_id, re_x, re_y, le_x, le_y) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            annotation.file_id,
            annotation.re_x,
            annotation.re_y,
            annotation.le_x,
            annotation.le_y
        ],
    )?;
    Ok(())
}

/// Client ids in insertion order. The shuffle in the search protocols
/// depends on this order, so it is never re-sorted.
pub(crate) fn client_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM client ORDER BY rowid")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

pub(crate) fn clients(conn: &Connection) -> Result<Vec<Client>> {
    let mut stmt = conn.prepare("SELECT id, sgroup FROM client ORDER BY rowid")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter()
        .map(|(id, group)| -> Result<Client> { Ok(Client { id, group: group.parse()? }) })
        .collect()
}

pub(crate) fn next_file_id(conn: &Connection) -> Result<i64> {
    let max: Option<i64> = conn.query_row("SELECT MAX(id) FROM file", [], |row| row.get(0))?;
    Ok(max.unwrap_or(0) + 1)
}

pub(crate) fn file_id_by_path(conn: &Connection, path: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM file WHERE path = ?1", [path], |row| row.get(0))
        .optional()?;
    Ok(id)
}

pub(crate) fn file(conn: &Connection, id: i64) -> Result<Option<File>> {
    let sql = format!("SELECT {} FROM file f WHERE f.id = ?1", FILE_COLUMNS);
    Ok(collect_files(conn, &sql, [id])?.into_iter().next())
}

/// All files of one client, optionally narrowed by modality and year, ordered by id.
pub(crate) fn files_of_client(
    conn: &Connection,
    client_id: &str,
    modality: Option<Modality>,
    year: Option<i32>,
) -> Result<Vec<File>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM file f
        WHERE f.client_id = ?1
          AND (?2 IS NULL OR f.modality = ?2)
          AND (?3 IS NULL OR f.year = ?3)
        ORDER BY f.id
        "#,
        FILE_COLUMNS
    );
    collect_files(conn, &sql, params![client_id, modality.map(|m| m.as_str()), year])
}

/// Files of a given modality and capture year across every client, ordered by id.
pub(crate) fn files_by_modality_year(
    conn: &Connection,
    modality: Modality,
    year: i32,
) -> Result<Vec<File>> {
    let sql = format!(
        "SELECT {} FROM file f WHERE f.modality = ?1 AND f.year = ?2 ORDER BY f.id",
        FILE_COLUMNS
    );
    collect_files(conn, &sql, params![modality.as_str(), year])
}

pub(crate) fn annotation(conn: &Connection, file_id: i64) -> Result<Option<Annotation>> {
    let annotation = conn
        .query_row(
            "SELECT file_id, re_x, re_y, le_x, le_y FROM annotation WHERE file_id = ?1",
            [file_id],
            |row| {
                Ok(Annotation {
                    file_id: row.get(0)?,
                    re_x: row.get(1)?,
                    re_y: row.get(2)?,
                    le_x: row.get(3)?,
                    le_y: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(annotation)
}

pub(crate) fn count(conn: &Connection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}
