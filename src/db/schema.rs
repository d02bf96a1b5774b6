//! Database schema and migrations for FileVault.
//!
//! The schema models a chunked object bucket: one `files` row per stored
//! file (the metadata document) and one `file_chunks` row per fixed-size
//! slice of its content.

/// Database migrations.
///
/// Each migration is a SQL script that will be executed in order.
/// The schema_version table tracks which migrations have been applied.
pub const MIGRATIONS: &[&str] = &[
    // v1: bucket tables
    r#"
-- One row per stored file. `metadata` is a JSON object.
CREATE TABLE files (
    id           TEXT PRIMARY KEY,
    filename     TEXT NOT NULL,
    length       INTEGER NOT NULL,
    chunk_size   INTEGER NOT NULL,
    upload_date  TEXT NOT NULL,           -- RFC 3339, microsecond precision, UTC
    metadata     TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX idx_files_upload_date ON files(upload_date);
CREATE INDEX idx_files_length ON files(length);

-- Content slices. Chunks are written before their files row inside the
-- same transaction, so the foreign key is checked at commit.
CREATE TABLE file_chunks (
    files_id  TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    n         INTEGER NOT NULL,
    data      BLOB NOT NULL,
    PRIMARY KEY (files_id, n)
);
"#,
    // v2: lookup indexes on metadata fields
    r#"
CREATE INDEX idx_files_hash_filename ON files(json_extract(metadata, '$.hash'), filename);
CREATE INDEX idx_files_chat_id ON files(json_extract(metadata, '$.chatId'));
"#,
];
