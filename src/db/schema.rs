pub const SCHEMA: &str = r#"
-- Clients: one row per dataset subject, in ingestion order
CREATE TABLE IF NOT EXISTS client (
    id TEXT PRIMARY KEY NOT NULL,
    sgroup TEXT NOT NULL DEFAULT 'world'   -- ingestion default; protocols define the effective group
);

-- Files: one row per image, ids assigned sequentially during ingestion
CREATE TABLE IF NOT EXISTS file (
    id INTEGER PRIMARY KEY,
    client_id TEXT NOT NULL,
    image_name TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,          -- relative to the dataset root, no extension
    modality TEXT NOT NULL,             -- 'VIS' or 'THERMAL'
    polarization TEXT NOT NULL,         -- 'N/A', 'S0', 'S1', 'S2', 'DoLP'
    capture_range TEXT NOT NULL,        -- 'R1'..'R3'
    condition TEXT NOT NULL,            -- 'B' or 'E'
    shot INTEGER NOT NULL,
    year INTEGER,
    FOREIGN KEY (client_id) REFERENCES client(id)
);

CREATE INDEX IF NOT EXISTS idx_file_client ON file(client_id);
CREATE INDEX IF NOT EXISTS idx_file_modality_year ON file(modality, year);

-- Eye landmarks, one per file
CREATE TABLE IF NOT EXISTS annotation (
    file_id INTEGER PRIMARY KEY,
    re_x INTEGER NOT NULL,
    re_y INTEGER NOT NULL,
    le_x INTEGER NOT NULL,
    le_y INTEGER NOT NULL,
    FOREIGN KEY (file_id) REFERENCES file(id) ON DELETE CASCADE
);

-- Protocols that were built, including those that matched no files
CREATE TABLE IF NOT EXISTS protocol (
    name TEXT PRIMARY KEY NOT NULL
);

-- Protocol/file association. A file has a single (group, purpose) per protocol.
CREATE TABLE IF NOT EXISTS protocol_file (
    protocol TEXT NOT NULL,
    sgroup TEXT NOT NULL,               -- 'world', 'dev', 'eval'
    purpose TEXT NOT NULL,              -- 'train', 'enroll', 'probe'
    file_id INTEGER NOT NULL,
    PRIMARY KEY (protocol, file_id),
    FOREIGN KEY (protocol) REFERENCES protocol(name),
    FOREIGN KEY (file_id) REFERENCES file(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_protocol_file_lookup ON protocol_file(protocol, sgroup, purpose);

-- Catalogs written before the protocol table existed
INSERT OR IGNORE INTO protocol (name) SELECT DISTINCT protocol FROM protocol_file;
"#;
