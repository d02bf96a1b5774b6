//! Chunked object bucket on SQLite.
//!
//! Each stored file is a `files` row (filename, length, upload date and a
//! JSON metadata document) plus its content split into `file_chunks` rows
//! of `chunk_size` bytes:
//! ```text
//! files        id | filename | length | chunk_size | upload_date | metadata
//! file_chunks  files_id | n | data
//!              ├── (id, 0, bytes[0..chunk_size])
//!              ├── (id, 1, bytes[chunk_size..2*chunk_size])
//!              └── ...
//! ```
//! An upload writes every chunk and then the `files` row inside a single
//! transaction, so an interrupted upload leaves neither behind.

use futures::Stream;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use super::filter::{FileFilter, SortBy, SortOrder, SortValue};
use super::metadata::{
    format_timestamp, keys, now, FileId, FileRow, StoredFile, DEFAULT_MIMETYPE,
};
use crate::{Result, VaultError};

const SELECT_FILES: &str = "SELECT id, filename, length, upload_date, metadata FROM files";

fn storage_failure(e: impl std::fmt::Display) -> VaultError {
    VaultError::StorageFailure(e.to_string())
}

/// Ordering and paging for [`Bucket::find`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    /// Sort key.
    pub sort_by: SortBy,
    /// Direction for both the key and the id tie-break.
    pub sort_order: SortOrder,
    /// Maximum rows to return (`None` = unbounded).
    pub limit: Option<i64>,
    /// Rows to skip.
    pub skip: i64,
}

impl FindOptions {
    /// Sort by `sort_by` in `sort_order`, unbounded.
    pub fn sorted(sort_by: SortBy, sort_order: SortOrder) -> Self {
        Self {
            sort_by,
            sort_order,
            limit: None,
            skip: 0,
        }
    }

    /// Limit the number of rows.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip leading rows.
    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }
}

/// Bucket of chunked files sharing one connection pool.
#[derive(Debug, Clone)]
pub struct Bucket {
    pool: SqlitePool,
    chunk_size: usize,
}

impl Bucket {
    /// Create a bucket over `pool`, splitting content into `chunk_size` byte rows.
    pub fn new(pool: SqlitePool, chunk_size: usize) -> Self {
        Self {
            pool,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk size used for new uploads.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Begin a new upload.
    ///
    /// Nothing becomes visible until [`UploadStream::finish`] commits.
    pub async fn open_upload_stream(
        &self,
        filename: &str,
        metadata: Map<String, Value>,
    ) -> Result<UploadStream> {
        let tx = self.pool.begin().await.map_err(storage_failure)?;

        Ok(UploadStream {
            tx: Some(tx),
            id: FileId::new(),
            filename: filename.to_string(),
            metadata,
            chunk_size: self.chunk_size,
            buffer: Vec::with_capacity(self.chunk_size),
            next_n: 0,
            length: 0,
        })
    }

    /// Open a reader over the chunks of `id`.
    pub async fn open_download_stream(&self, id: FileId) -> Result<DownloadStream> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE id = ?)")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(VaultError::NotFound(format!("file {id}")));
        }

        let chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM file_chunks WHERE files_id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(DownloadStream {
            pool: self.pool.clone(),
            id,
            next_n: 0,
            chunk_count,
        })
    }

    /// Find files matching `filter`.
    pub async fn find(&self, filter: &FileFilter, options: &FindOptions) -> Result<Vec<StoredFile>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_FILES);
        filter.push_where(&mut query);

        let direction = options.sort_order.keyword();
        query
            .push(" ORDER BY ")
            .push(options.sort_by.expression())
            .push(" ")
            .push(direction)
            .push(", id ")
            .push(direction);

        match options.limit {
            Some(limit) => {
                query.push(" LIMIT ").push_bind(limit);
            }
            None if options.skip > 0 => {
                query.push(" LIMIT -1");
            }
            None => {}
        }
        if options.skip > 0 {
            query.push(" OFFSET ").push_bind(options.skip);
        }

        let rows = query
            .build_query_as::<FileRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredFile::try_from).collect()
    }

    /// First file matching `filter`, oldest first.
    pub async fn find_one(&self, filter: &FileFilter) -> Result<Option<StoredFile>> {
        let options = FindOptions::sorted(SortBy::CreatedAt, SortOrder::Asc).with_limit(1);
        Ok(self.find(filter, &options).await?.into_iter().next())
    }

    /// Get a file by id.
    pub async fn find_by_id(&self, id: FileId) -> Result<Option<StoredFile>> {
        let row = sqlx::query_as::<_, FileRow>(&format!("{SELECT_FILES} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(StoredFile::try_from).transpose()
    }

    /// Count files matching `filter`.
    pub async fn count(&self, filter: &FileFilter) -> Result<i64> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM files");
        filter.push_where(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Total number of stored chunks across all files.
    pub async fn chunk_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM file_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Resolve the sort key of `id`, or `None` if it does not exist.
    pub async fn sort_value(&self, id: FileId, sort_by: SortBy) -> Result<Option<SortValue>> {
        let sql = format!("SELECT {} FROM files WHERE id = ?", sort_by.expression());

        let value = match sort_by {
            SortBy::Size => sqlx::query_scalar::<_, i64>(&sql)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .map(SortValue::Int),
            SortBy::CreatedAt | SortBy::UpdatedAt => sqlx::query_scalar::<_, String>(&sql)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?
                .map(SortValue::Text),
        };

        Ok(value)
    }

    /// Replace the metadata document of `id`, and its filename if given.
    ///
    /// Returns false if no such file exists.
    pub async fn update(
        &self,
        id: FileId,
        filename: Option<&str>,
        metadata: &Map<String, Value>,
    ) -> Result<bool> {
        let metadata = serde_json::to_string(metadata)?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE files SET metadata = ");
        query.push_bind(metadata);
        if let Some(filename) = filename {
            query.push(", filename = ").push_bind(filename.to_string());
        }
        query.push(" WHERE id = ").push_bind(id.to_string());

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a file and its chunks.
    ///
    /// Fails with `NotFound` if the file does not exist.
    pub async fn delete(&self, id: FileId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(VaultError::NotFound(format!("file {id}")));
        }

        sqlx::query("DELETE FROM file_chunks WHERE files_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// In-progress upload.
///
/// Chunks are written inside an open transaction. Dropping the stream
/// without calling [`UploadStream::finish`] rolls everything back.
pub struct UploadStream {
    tx: Option<Transaction<'static, Sqlite>>,
    id: FileId,
    filename: String,
    metadata: Map<String, Value>,
    chunk_size: usize,
    buffer: Vec<u8>,
    next_n: i64,
    length: i64,
}

impl UploadStream {
    /// Id the file will have once committed.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Append bytes, flushing every full chunk.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);

        while self.buffer.len() >= self.chunk_size {
            let chunk: Vec<u8> = self.buffer.drain(..self.chunk_size).collect();
            self.write_chunk(chunk).await?;
        }

        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<()> {
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| VaultError::StorageFailure("upload stream is closed".to_string()))?;

        let len = chunk.len() as i64;
        sqlx::query("INSERT INTO file_chunks (files_id, n, data) VALUES (?, ?, ?)")
            .bind(self.id.to_string())
            .bind(self.next_n)
            .bind(chunk)
            .execute(&mut **tx)
            .await
            .map_err(storage_failure)?;

        self.next_n += 1;
        self.length += len;
        Ok(())
    }

    /// Flush the tail chunk, write the `files` row and commit.
    pub async fn finish(mut self) -> Result<StoredFile> {
        if !self.buffer.is_empty() {
            let tail = std::mem::take(&mut self.buffer);
            self.write_chunk(tail).await?;
        }

        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| VaultError::StorageFailure("upload stream is closed".to_string()))?;

        let upload_date = now();
        let metadata = serde_json::to_string(&self.metadata)?;

        sqlx::query(
            "INSERT INTO files (id, filename, length, chunk_size, upload_date, metadata)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(self.id.to_string())
        .bind(&self.filename)
        .bind(self.length)
        .bind(self.chunk_size as i64)
        .bind(format_timestamp(&upload_date))
        .bind(metadata)
        .execute(&mut *tx)
        .await
        .map_err(storage_failure)?;

        tx.commit().await.map_err(storage_failure)?;

        let mimetype = self
            .metadata
            .get(keys::MIMETYPE)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MIMETYPE)
            .to_string();
        let content_hash = self
            .metadata
            .get(keys::HASH)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(StoredFile {
            id: self.id,
            filename: self.filename,
            size: self.length,
            mimetype,
            upload_date,
            content_hash,
            metadata: self.metadata,
        })
    }

    /// Discard everything written so far.
    pub async fn abort(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(storage_failure)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadStream")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("length", &self.length)
            .finish()
    }
}

/// Sequential reader over a file's chunks.
#[derive(Debug)]
pub struct DownloadStream {
    pool: SqlitePool,
    id: FileId,
    next_n: i64,
    chunk_count: i64,
}

impl DownloadStream {
    /// Id of the file being read.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Next chunk, or `None` once all chunks have been read.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.next_n >= self.chunk_count {
            return Ok(None);
        }

        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM file_chunks WHERE files_id = ? AND n = ?")
                .bind(self.id.to_string())
                .bind(self.next_n)
                .fetch_optional(&self.pool)
                .await?;

        match data {
            Some(data) => {
                self.next_n += 1;
                Ok(Some(data))
            }
            None => Err(VaultError::StorageFailure(format!(
                "chunk {} of file {} is missing",
                self.next_n, self.id
            ))),
        }
    }

    /// Read all remaining chunks into one buffer.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }

    /// Adapt into a stream of chunks, e.g. for an HTTP response body.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
        futures::stream::try_unfold(self, |mut reader| async move {
            let chunk = reader.next_chunk().await?;
            Ok::<_, VaultError>(chunk.map(|chunk| (chunk, reader)))
        })
    }
}
