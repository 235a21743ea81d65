use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use blobtier_layout::{BlobExtent, ChunkLayout, LayoutError};
use blobtier_types::{BlockKey, ContentHash};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::error::{OpenError, StoreError, StoreResult};
use crate::traits::{write_end, BlobStore};

/// Schema version stamped into `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS blobs (
    hash TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    total_size INTEGER NOT NULL,
    extra_block_count INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS blocks (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

/// Where a [`SqliteBlobStore`] keeps its database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    /// A database file; parent directories are created on open.
    File(PathBuf),
    /// A private in-memory database, discarded when the store drops.
    Memory,
}

/// Shape of one stored base record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BaseRecordInfo {
    pub base_len: u64,
    pub total_size: u64,
    pub extra_block_count: u64,
}

/// Snapshot of record-access counters since the store was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub base_reads: u64,
    pub block_reads: u64,
    pub block_writes: u64,
    pub zero_filled_blocks: u64,
}

#[derive(Debug, Default)]
struct Counters {
    base_reads: AtomicU64,
    block_reads: AtomicU64,
    block_writes: AtomicU64,
    zero_filled_blocks: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

type SharedConnection = Arc<Mutex<Connection>>;

/// Chunked blob store on SQLite.
///
/// Each blob is one row in `blobs` holding the first `threshold` bytes plus
/// its size and block count, and one row per block in `blocks` keyed
/// `"{hash}-{n}"`. Every call runs in its own transaction.
///
/// Construction is cheap; the database is opened on first use. A failed
/// open is remembered and reported by every later call.
pub struct SqliteBlobStore {
    location: StoreLocation,
    layout: ChunkLayout,
    conn: OnceCell<Result<SharedConnection, OpenError>>,
    stats: Arc<Counters>,
}

impl SqliteBlobStore {
    pub fn new(location: StoreLocation, layout: ChunkLayout) -> Self {
        Self {
            location,
            layout,
            conn: OnceCell::new(),
            stats: Arc::new(Counters::default()),
        }
    }

    /// A store backed by a private in-memory database.
    pub fn in_memory(layout: ChunkLayout) -> Self {
        Self::new(StoreLocation::Memory, layout)
    }

    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl Into<PathBuf>, layout: ChunkLayout) -> StoreResult<Self> {
        let store = Self::new(StoreLocation::File(path.into()), layout);
        store.ready().await?;
        Ok(store)
    }

    /// Force the database open, reporting any open failure.
    pub async fn ready(&self) -> StoreResult<()> {
        self.connection().await.map(|_| ())
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            base_reads: self.stats.base_reads.load(Ordering::Relaxed),
            block_reads: self.stats.block_reads.load(Ordering::Relaxed),
            block_writes: self.stats.block_writes.load(Ordering::Relaxed),
            zero_filled_blocks: self.stats.zero_filled_blocks.load(Ordering::Relaxed),
        }
    }

    /// Shape of the base record of `hash`, if any.
    pub async fn inspect(&self, hash: &ContentHash) -> StoreResult<Option<BaseRecordInfo>> {
        let hash = hash.clone();
        let layout = self.layout;
        self.with_connection(move |conn| {
            Ok(load_base(conn, &hash, &layout)?.map(|base| BaseRecordInfo {
                base_len: base.data.len() as u64,
                total_size: base.total_size,
                extra_block_count: base.extra_block_count,
            }))
        })
        .await
    }

    /// Raw content of one block record, without shape checks.
    pub async fn block(&self, hash: &ContentHash, block_number: u64) -> StoreResult<Option<Vec<u8>>> {
        let key = hash.block_key(block_number).to_string();
        self.with_connection(move |conn| {
            Ok(conn
                .query_row("SELECT data FROM blocks WHERE key = ?1", params![key], |row| row.get(0))
                .optional()?)
        })
        .await
    }

    async fn connection(&self) -> StoreResult<SharedConnection> {
        let opened = self
            .conn
            .get_or_init(|| async {
                let location = self.location.clone();
                let layout = self.layout;
                let result = tokio::task::spawn_blocking(move || open_connection(&location, &layout))
                    .await
                    .unwrap_or_else(|e| Err(OpenError::Io(format!("open task failed: {e}"))));
                match result {
                    Ok(conn) => Ok(Arc::new(Mutex::new(conn))),
                    Err(e) => {
                        error!(location = ?self.location, error = %e, "failed to open blob store");
                        Err(e)
                    }
                }
            })
            .await;
        match opened {
            Ok(conn) => Ok(Arc::clone(conn)),
            Err(e) => Err(StoreError::Unavailable(e.clone())),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection().await?;
        tokio::task::spawn_blocking(move || {
            // A panic inside a transaction rolls it back on unwind, so a
            // poisoned connection is still consistent.
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl BlobStore for SqliteBlobStore {
    async fn read(&self, hash: &ContentHash, offset: u64, count: u64) -> StoreResult<Option<Vec<u8>>> {
        let hash = hash.clone();
        let layout = self.layout;
        let stats = Arc::clone(&self.stats);
        self.with_connection(move |conn| read_blob(conn, &layout, &stats, &hash, offset, count))
            .await
    }

    async fn write(&self, hash: &ContentHash, offset: u64, bytes: &[u8]) -> StoreResult<u64> {
        let hash = hash.clone();
        let bytes = bytes.to_vec();
        let layout = self.layout;
        let stats = Arc::clone(&self.stats);
        self.with_connection(move |conn| write_blob(conn, &layout, &stats, &hash, offset, &bytes))
            .await
    }

    async fn size(&self, hash: &ContentHash) -> StoreResult<Option<u64>> {
        let hash = hash.clone();
        let layout = self.layout;
        self.with_connection(move |conn| Ok(load_base(conn, &hash, &layout)?.map(|b| b.total_size)))
            .await
    }
}

impl std::fmt::Debug for SqliteBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBlobStore")
            .field("location", &self.location)
            .field("layout", &self.layout)
            .field("opened", &self.conn.initialized())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Open and migration
// ---------------------------------------------------------------------------

fn open_connection(location: &StoreLocation, layout: &ChunkLayout) -> Result<Connection, OpenError> {
    let mut conn = match location {
        StoreLocation::File(path) => {
            create_parent_dir(path)?;
            let conn = Connection::open(path)?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(path = %path.display(), journal_mode = %mode, "opened database file");
            conn
        }
        StoreLocation::Memory => Connection::open_in_memory()?,
    };
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrate(&mut conn)?;
    check_layout(&conn, layout)?;
    info!(
        location = ?location,
        threshold = layout.threshold(),
        block_size = layout.block_size(),
        "blob store ready"
    );
    Ok(conn)
}

fn create_parent_dir(path: &Path) -> Result<(), OpenError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Ok(std::fs::create_dir_all(parent)?),
        _ => Ok(()),
    }
}

fn migrate(conn: &mut Connection) -> Result<(), OpenError> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    match version {
        0 => {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA_V1)?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tx.commit()?;
            info!(version = SCHEMA_VERSION, "initialized blob store schema");
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        found => Err(OpenError::SchemaVersion {
            found,
            supported: SCHEMA_VERSION,
        }),
    }
}

fn meta_value(conn: &Connection, key: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT value FROM store_meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
}

fn stored_size(key: &str, value: i64) -> Result<u64, OpenError> {
    u64::try_from(value)
        .map_err(|_| OpenError::Database(format!("corrupt store_meta value {key} = {value}")))
}

/// Record the layout on first open; reject a different one afterwards.
fn check_layout(conn: &Connection, layout: &ChunkLayout) -> Result<(), OpenError> {
    match (meta_value(conn, "threshold")?, meta_value(conn, "block_size")?) {
        (Some(threshold), Some(block_size)) => {
            let stored = (stored_size("threshold", threshold)?, stored_size("block_size", block_size)?);
            if stored != (layout.threshold(), layout.block_size()) {
                return Err(OpenError::layout_mismatch(stored, layout));
            }
            Ok(())
        }
        _ => {
            // Layout values are bounded by MAX_RECORD_SIZE, well inside i64.
            conn.execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('threshold', ?1), ('block_size', ?2)",
                params![layout.threshold() as i64, layout.block_size() as i64],
            )?;
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

struct BaseRecord {
    data: Vec<u8>,
    total_size: u64,
    extra_block_count: u64,
}

impl BaseRecord {
    fn extent(&self) -> BlobExtent {
        BlobExtent {
            base_len: self.data.len() as u64,
            total_size: self.total_size,
            extra_block_count: self.extra_block_count,
        }
    }
}

fn corrupt(key: impl ToString, reason: String) -> StoreError {
    let key = key.to_string();
    error!(%key, %reason, "corrupt blob store record");
    StoreError::CorruptRecord { key, reason }
}

fn missing_block(key: &BlockKey, extra_block_count: u64) -> StoreError {
    let key = key.to_string();
    error!(%key, extra_block_count, "block record missing below block count");
    StoreError::MissingBlock {
        key,
        extra_block_count,
    }
}

fn load_base(conn: &Connection, hash: &ContentHash, layout: &ChunkLayout) -> StoreResult<Option<BaseRecord>> {
    let row = conn
        .query_row(
            "SELECT data, total_size, extra_block_count FROM blobs WHERE hash = ?1",
            params![hash.as_str()],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
        )
        .optional()?;
    let Some((data, total_size, extra_block_count)) = row else {
        return Ok(None);
    };

    let total_size =
        u64::try_from(total_size).map_err(|_| corrupt(hash, format!("negative total size {total_size}")))?;
    let extra_block_count = u64::try_from(extra_block_count)
        .map_err(|_| corrupt(hash, format!("negative block count {extra_block_count}")))?;
    let base_len = data.len() as u64;
    if base_len > layout.threshold() {
        return Err(corrupt(
            hash,
            format!("base holds {base_len} bytes, threshold is {}", layout.threshold()),
        ));
    }
    if total_size < base_len {
        return Err(corrupt(
            hash,
            format!("total size {total_size} is below base length {base_len}"),
        ));
    }

    Ok(Some(BaseRecord {
        data,
        total_size,
        extra_block_count,
    }))
}

fn load_block(conn: &Connection, key: &BlockKey, layout: &ChunkLayout) -> StoreResult<Option<Vec<u8>>> {
    let data: Option<Vec<u8>> = conn
        .prepare_cached("SELECT data FROM blocks WHERE key = ?1")?
        .query_row(params![key.to_string()], |row| row.get(0))
        .optional()?;
    match data {
        Some(block) if block.len() != layout.block_len() => Err(corrupt(
            key,
            format!("block holds {} bytes, block size is {}", block.len(), layout.block_size()),
        )),
        other => Ok(other),
    }
}

fn put_block(conn: &Connection, key: &BlockKey, data: &[u8]) -> StoreResult<()> {
    conn.prepare_cached("INSERT OR REPLACE INTO blocks (key, data) VALUES (?1, ?2)")?
        .execute(params![key.to_string(), data])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

fn read_blob(
    conn: &mut Connection,
    layout: &ChunkLayout,
    stats: &Counters,
    hash: &ContentHash,
    offset: u64,
    count: u64,
) -> StoreResult<Option<Vec<u8>>> {
    // A read transaction keeps the base and its blocks on one snapshot.
    let tx = conn.transaction()?;
    let Some(base) = load_base(&tx, hash, layout)? else {
        return Ok(None);
    };
    Counters::bump(&stats.base_reads);

    let plan = layout.plan_read(&base.extent(), offset, count)?;
    let mut out = vec![0u8; plan.len];
    if let Some(span) = plan.base {
        out[span.buf_offset..span.buf_offset + span.len]
            .copy_from_slice(&base.data[span.record_offset..span.record_offset + span.len]);
    }
    for span in &plan.blocks {
        let key = hash.block_key(span.block_number);
        let block = load_block(&tx, &key, layout)?
            .ok_or_else(|| missing_block(&key, base.extra_block_count))?;
        Counters::bump(&stats.block_reads);
        out[span.buf_offset..span.buf_offset + span.len]
            .copy_from_slice(&block[span.offset_in_block..span.offset_in_block + span.len]);
    }

    debug!(
        hash = hash.short(),
        offset,
        count,
        returned = out.len(),
        blocks = plan.blocks.len(),
        "sqlite read"
    );
    Ok(Some(out))
}

fn write_blob(
    conn: &mut Connection,
    layout: &ChunkLayout,
    stats: &Counters,
    hash: &ContentHash,
    offset: u64,
    bytes: &[u8],
) -> StoreResult<u64> {
    write_end(offset, bytes.len())?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = load_base(&tx, hash, layout)?;
    if existing.is_some() {
        Counters::bump(&stats.base_reads);
    }
    let extent = existing.as_ref().map(BaseRecord::extent).unwrap_or_default();

    let plan = layout
        .plan_write(&extent, offset, bytes.len())
        .map_err(|e| match e {
            LayoutError::Unanchored { .. } | LayoutError::BaseOverflow { .. } => corrupt(hash, e.to_string()),
            other => StoreError::Layout(other),
        })?;
    // Both are bounded by MAX_BLOB_SIZE: the stored size passed shape checks
    // and the write end was checked above.
    let total_size = plan.new_total_size as i64;
    let extra_block_count = plan.new_extra_block_count as i64;

    let mut data = existing.map(|base| base.data).unwrap_or_default();
    data.resize(plan.new_base_len, 0);
    if let Some(chunk) = &plan.base {
        let end = chunk.record_offset + chunk.src.len();
        data[chunk.record_offset..end].copy_from_slice(&bytes[chunk.src.clone()]);
    }

    for chunk in &plan.blocks {
        let key = hash.block_key(chunk.block_number);
        let block = if chunk.is_full(layout) {
            bytes[chunk.src.clone()].to_vec()
        } else {
            let mut block = if chunk.block_number < extent.extra_block_count {
                Counters::bump(&stats.block_reads);
                load_block(&tx, &key, layout)?.ok_or_else(|| missing_block(&key, extent.extra_block_count))?
            } else {
                vec![0u8; layout.block_len()]
            };
            let end = chunk.offset_in_block + chunk.src.len();
            block[chunk.offset_in_block..end].copy_from_slice(&bytes[chunk.src.clone()]);
            block
        };
        put_block(&tx, &key, &block)?;
        Counters::bump(&stats.block_writes);
    }

    if !plan.zero_fill.is_empty() {
        let zeros = vec![0u8; layout.block_len()];
        for block_number in plan.zero_fill.clone() {
            put_block(&tx, &hash.block_key(block_number), &zeros)?;
            Counters::bump(&stats.zero_filled_blocks);
        }
    }

    tx.execute(
        "INSERT OR REPLACE INTO blobs (hash, data, total_size, extra_block_count) VALUES (?1, ?2, ?3, ?4)",
        params![hash.as_str(), data, total_size, extra_block_count],
    )?;
    tx.commit()?;

    debug!(
        hash = hash.short(),
        offset,
        len = bytes.len(),
        size = plan.new_total_size,
        blocks_written = plan.blocks.len(),
        zero_filled = plan.zero_fill_count(),
        "sqlite write"
    );
    Ok(plan.new_total_size)
}
