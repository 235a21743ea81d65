//! Behavior every [`BlobStore`] implementation shares, checked against each
//! backend.

use std::sync::Arc;

use async_trait::async_trait;
use blobtier_layout::ChunkLayout;
use blobtier_remote::{OriginError, OriginResult, RemoteOrigin};
use blobtier_types::ContentHash;
use proptest::prelude::*;

use crate::error::StoreError;
use crate::layered::LayeredStore;
use crate::memory::MemoryBlobStore;
use crate::sqlite::{SqliteBlobStore, StoreLocation};
use crate::traits::{BlobStore, MAX_BLOB_SIZE};

const T: u64 = 4096;
const BS: u64 = 4096;

fn hash(s: &str) -> ContentHash {
    ContentHash::new(s).unwrap()
}

/// Deterministic, position-dependent fill so misplaced bytes show up.
fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Origin that knows nothing; layered stores then behave like their local
/// tier for everything that was written locally.
struct NoOrigin;

#[async_trait]
impl RemoteOrigin for NoOrigin {
    async fn fetch(&self, hash: &ContentHash) -> OriginResult<Vec<u8>> {
        Err(OriginError::NotFound(hash.clone()))
    }
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

async fn check_absent(store: &dyn BlobStore) {
    let h = hash("never-written");
    assert!(store.read(&h, 0, 10).await.unwrap().is_none());
    assert!(store.read(&h, 1_000_000, 10).await.unwrap().is_none());
    assert_eq!(store.size(&h).await.unwrap(), None);
    assert!(!store.exists(&h).await.unwrap());
}

async fn check_round_trip_grid(store: &dyn BlobStore) {
    let offsets = [0, T - 1, T, T + 1, T + 2 * BS + 17];
    let lengths = [1, T as usize, BS as usize + 3];
    for (i, &offset) in offsets.iter().enumerate() {
        for (j, &len) in lengths.iter().enumerate() {
            let h = hash(&format!("grid-{i}-{j}"));
            let bytes = pattern(len, (i * 7 + j) as u8);
            let size = store.write(&h, offset, &bytes).await.unwrap();
            assert_eq!(size, offset + len as u64, "offset {offset} len {len}");

            let read = store.read(&h, offset, len as u64).await.unwrap().unwrap();
            assert!(read == bytes, "round trip mismatch at offset {offset} len {len}");

            // Everything before the write is a hole.
            let prefix = store.read(&h, 0, offset).await.unwrap().unwrap();
            assert_eq!(prefix.len() as u64, offset);
            assert!(prefix.iter().all(|&b| b == 0), "hole not zero at offset {offset}");
        }
    }
}

async fn check_read_past_end(store: &dyn BlobStore) {
    let h = hash("short");
    store.write(&h, 0, b"0123456789").await.unwrap();
    assert!(store.read(&h, 10, 5).await.unwrap().unwrap().is_empty());
    assert!(store.read(&h, 11, 5).await.unwrap().unwrap().is_empty());
    assert!(store.read(&h, u64::MAX, u64::MAX).await.unwrap().unwrap().is_empty());
    assert_eq!(store.read(&h, 8, 5).await.unwrap().unwrap(), b"89");
}

async fn check_size_is_monotonic(store: &dyn BlobStore) {
    let h = hash("grow");
    let writes: [(u64, usize); 5] = [(0, 10), (5000, 3), (100, 50), (0, 0), (9000, 4096)];
    let mut expected = 0u64;
    for (offset, len) in writes {
        expected = expected.max(offset + len as u64);
        let size = store.write(&h, offset, &pattern(len, 1)).await.unwrap();
        assert_eq!(size, expected);
        assert_eq!(store.size(&h).await.unwrap(), Some(expected));
    }
}

async fn check_straddling_example(store: &dyn BlobStore) {
    let h = hash("h");
    let bytes = pattern(6000, 3);
    assert_eq!(store.write(&h, 0, &bytes).await.unwrap(), 6000);
    let read = store.read(&h, 4090, 20).await.unwrap().unwrap();
    assert_eq!(read, &bytes[4090..4110]);
    assert_eq!(store.read_all(&h).await.unwrap().unwrap(), bytes);
}

async fn check_overwrite_in_place(store: &dyn BlobStore) {
    let h = hash("rewrite");
    let mut model = pattern(3 * T as usize, 9);
    store.write(&h, 0, &model).await.unwrap();

    let patch = vec![0xAB; BS as usize + 100];
    let at = T as usize - 50;
    model[at..at + patch.len()].copy_from_slice(&patch);
    assert_eq!(store.write(&h, at as u64, &patch).await.unwrap(), 3 * T);
    assert_eq!(store.read_all(&h).await.unwrap().unwrap(), model);
}

async fn check_change_size(store: &dyn BlobStore) {
    let h = hash("resize");
    assert_eq!(store.change_size(&h, 5000).await.unwrap(), 5000);
    let data = store.read_all(&h).await.unwrap().unwrap();
    assert_eq!(data.len(), 5000);
    assert!(data.iter().all(|&b| b == 0));

    store.write(&h, 0, b"head").await.unwrap();
    assert_eq!(store.change_size(&h, 5000).await.unwrap(), 5000);
    assert_eq!(store.change_size(&h, 9000).await.unwrap(), 9000);
    assert_eq!(store.read(&h, 0, 4).await.unwrap().unwrap(), b"head");

    let err = store.change_size(&h, 10).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::ShrinkUnsupported { current: 9000, requested: 10, .. }
    ));
    assert_eq!(store.size(&h).await.unwrap(), Some(9000));
}

async fn check_size_limit(store: &dyn BlobStore) {
    let h = hash("limit");
    store.write(&h, 0, b"small").await.unwrap();
    for (offset, bytes) in [(1u64 << 63, &b""[..]), (MAX_BLOB_SIZE, &b"x"[..]), (u64::MAX, &b"x"[..])] {
        let err = store.write(&h, offset, bytes).await.unwrap_err();
        assert!(matches!(err, StoreError::SizeOverflow(_)), "offset {offset}: {err}");
    }
    assert_eq!(store.size(&h).await.unwrap(), Some(5));
    assert_eq!(store.read_all(&h).await.unwrap().unwrap(), b"small");
}

/// Generates the shared contract tests for one backend constructor.
macro_rules! contract_tests {
    ($name:ident, $make:expr) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn round_trip_grid() {
                let store = $make;
                check_round_trip_grid(&store).await;
            }

            #[tokio::test]
            async fn read_past_end_is_empty() {
                let store = $make;
                check_read_past_end(&store).await;
            }

            #[tokio::test]
            async fn size_is_monotonic() {
                let store = $make;
                check_size_is_monotonic(&store).await;
            }

            #[tokio::test]
            async fn straddling_example() {
                let store = $make;
                check_straddling_example(&store).await;
            }

            #[tokio::test]
            async fn overwrite_in_place() {
                let store = $make;
                check_overwrite_in_place(&store).await;
            }

            #[tokio::test]
            async fn change_size() {
                let store = $make;
                check_change_size(&store).await;
            }

            #[tokio::test]
            async fn size_limit() {
                let store = $make;
                check_size_limit(&store).await;
            }
        }
    };
}

contract_tests!(memory, MemoryBlobStore::new());
contract_tests!(sqlite, SqliteBlobStore::in_memory(ChunkLayout::default()));
contract_tests!(
    sqlite_small_layout,
    SqliteBlobStore::in_memory(ChunkLayout::new(100, 37).unwrap())
);
contract_tests!(layered, LayeredStore::new(MemoryBlobStore::new(), NoOrigin));
contract_tests!(
    layered_sqlite,
    LayeredStore::new(SqliteBlobStore::in_memory(ChunkLayout::default()), NoOrigin)
);

// Layered stores turn an unknown hash into an origin fetch, so only the
// plain backends report it as absent.

#[tokio::test]
async fn memory_absent() {
    check_absent(&MemoryBlobStore::new()).await;
}

#[tokio::test]
async fn sqlite_absent() {
    check_absent(&SqliteBlobStore::in_memory(ChunkLayout::default())).await;
}

#[tokio::test]
async fn sqlite_file_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteBlobStore::new(
        StoreLocation::File(dir.path().join("contract.db")),
        ChunkLayout::default(),
    );
    check_absent(&store).await;
    check_round_trip_grid(&store).await;
    check_straddling_example(&store).await;
}

#[tokio::test]
async fn shared_handles_see_same_data() {
    let store: Arc<dyn BlobStore> = Arc::new(SqliteBlobStore::in_memory(ChunkLayout::default()));
    let other = Arc::clone(&store);
    store.write(&hash("s"), 0, b"shared").await.unwrap();
    assert_eq!(other.read_all(&hash("s")).await.unwrap().unwrap(), b"shared");
}

// ---------------------------------------------------------------------------
// Flat-model property
// ---------------------------------------------------------------------------

/// Apply `writes` to `store` and to a zero-initialized flat buffer, then
/// compare full and partial reads.
async fn check_against_model(
    store: &dyn BlobStore,
    writes: &[(u64, Vec<u8>)],
    ranges: &[(u64, u64)],
) -> Result<(), TestCaseError> {
    let h = hash("model");
    let mut model: Vec<u8> = Vec::new();
    for (offset, bytes) in writes {
        let end = *offset as usize + bytes.len();
        if model.len() < end {
            model.resize(end, 0);
        }
        model[*offset as usize..end].copy_from_slice(bytes);

        let size = store.write(&h, *offset, bytes).await.unwrap();
        prop_assert_eq!(size, model.len() as u64);
    }

    prop_assert_eq!(store.read_all(&h).await.unwrap().unwrap(), model.clone());
    for &(offset, count) in ranges {
        let start = (offset as usize).min(model.len());
        let end = (offset + count).min(model.len() as u64) as usize;
        let read = store.read(&h, offset, count).await.unwrap().unwrap();
        prop_assert_eq!(read, model[start..end].to_vec());
    }
    Ok(())
}

fn write_op() -> impl Strategy<Value = (u64, Vec<u8>)> {
    (0u64..120, prop::collection::vec(any::<u8>(), 0..60))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn memory_matches_flat_model(
        writes in prop::collection::vec(write_op(), 1..12),
        ranges in prop::collection::vec((0u64..200, 0u64..100), 0..6),
    ) {
        let store = MemoryBlobStore::new();
        runtime().block_on(check_against_model(&store, &writes, &ranges))?;
    }

    #[test]
    fn sqlite_matches_flat_model(
        writes in prop::collection::vec(write_op(), 1..12),
        ranges in prop::collection::vec((0u64..200, 0u64..100), 0..6),
    ) {
        let store = SqliteBlobStore::in_memory(ChunkLayout::new(16, 8).unwrap());
        runtime().block_on(check_against_model(&store, &writes, &ranges))?;
    }
}
