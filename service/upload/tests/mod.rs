use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain_upload::{
    command::{ReceiveFragmentCommand, MAX_UPLOAD_KEY_LEN},
    exception::{UploadException, UploadResult},
    mock::MockChunkStore,
    model::vo::{UploadCompleted, UploadProgress, UploadStatus},
    service::{ChunkStore, OrderedFragments, UploadCoordinatorService},
};
use futures::StreamExt;
use rand::seq::SliceRandom;
use service_upload::{LocalChunkStoreImpl, UploadCoordinatorImpl};
use tempfile::TempDir;
use tokio::sync::Notify;

fn fragment(key: &str, index: u64, total: u64, payload: &[u8]) -> ReceiveFragmentCommand {
    ReceiveFragmentCommand {
        upload_key: key.to_owned(),
        index,
        total_fragments: total,
        hash: None,
        payload: payload.to_vec(),
    }
}

struct Harness {
    dir: TempDir,
    store: Arc<LocalChunkStoreImpl>,
    coordinator: Arc<UploadCoordinatorImpl>,
    completions: flume::Receiver<UploadCompleted>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalChunkStoreImpl::builder().base(dir.path().join("scratch")).build());
        Self::with_store(dir, store.clone(), store)
    }

    fn with_store(dir: TempDir, store: Arc<LocalChunkStoreImpl>, chunk_store: Arc<dyn ChunkStore>) -> Self {
        let (sender, completions) = flume::unbounded();
        let coordinator = Arc::new(
            UploadCoordinatorImpl::builder()
                .chunk_store(chunk_store)
                .destination(dir.path().join("uploads"))
                .completion_sender(sender)
                .build(),
        );
        Self {
            dir,
            store,
            coordinator,
            completions,
        }
    }

    async fn artifact(&self, key: &str) -> Vec<u8> {
        tokio::fs::read(self.dir.path().join("uploads").join(key)).await.unwrap()
    }

    async fn artifact_exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.dir.path().join("uploads").join(key)).await.unwrap()
    }
}

#[tokio::test]
async fn out_of_order_upload_assembles_and_purges() {
    let h = Harness::new();
    let first = h.coordinator.receive_fragment(fragment("clip1", 1, 3, b"B")).await.unwrap();
    assert!(matches!(first, UploadProgress::Accepted { received: 1, total: 3, .. }));
    h.coordinator.receive_fragment(fragment("clip1", 0, 3, b"A")).await.unwrap();
    let last = h.coordinator.receive_fragment(fragment("clip1", 2, 3, b"C")).await.unwrap();

    let location = last.location().cloned().unwrap();
    assert_eq!(location, h.dir.path().join("uploads").join("clip1"));
    assert_eq!(h.artifact("clip1").await, b"ABC");
    assert!(!h.store.has_namespace("clip1").await.unwrap());
    assert_eq!(h.completions.len(), 1);
}

#[tokio::test]
async fn last_write_for_an_index_wins() {
    let h = Harness::new();
    h.coordinator.receive_fragment(fragment("clip2", 0, 2, b"X")).await.unwrap();
    let again = h.coordinator.receive_fragment(fragment("clip2", 0, 2, b"Y")).await.unwrap();
    assert!(matches!(again, UploadProgress::Accepted { received: 1, .. }));
    h.coordinator.receive_fragment(fragment("clip2", 1, 2, b"Z")).await.unwrap();
    assert_eq!(h.artifact("clip2").await, b"YZ");
}

fn permutations(items: &[u64]) -> Vec<Vec<u64>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut all = vec![];
    for (i, head) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, *head);
            all.push(tail);
        }
    }
    all
}

#[tokio::test]
async fn every_arrival_order_yields_the_same_file() {
    let h = Harness::new();
    let payloads: [&[u8]; 4] = [b"kick", b"-", b"off", b"!!"];
    for (n, order) in permutations(&[0, 1, 2, 3]).into_iter().enumerate() {
        let key = format!("perm-{n}");
        let mut outcome = None;
        for index in order {
            outcome = Some(
                h.coordinator
                    .receive_fragment(fragment(&key, index, 4, payloads[index as usize]))
                    .await
                    .unwrap(),
            );
        }
        assert!(outcome.unwrap().location().is_some());
        assert_eq!(h.artifact(&key).await, b"kick-off!!");
    }
    assert_eq!(h.completions.len(), 24);
}

#[tokio::test]
async fn resent_fragments_are_counted_once() {
    let h = Harness::new();
    for _ in 0..3 {
        h.coordinator.receive_fragment(fragment("clip3", 1, 3, b"two")).await.unwrap();
    }
    let session = h.coordinator.info("clip3").await.unwrap();
    assert_eq!(session.received_count(), 1);
    assert_eq!(session.missing().collect::<Vec<_>>(), vec![0, 2]);

    h.coordinator.receive_fragment(fragment("clip3", 0, 3, b"one")).await.unwrap();
    h.coordinator.receive_fragment(fragment("clip3", 2, 3, b"three")).await.unwrap();
    assert_eq!(h.artifact("clip3").await, b"onetwothree");
}

#[tokio::test]
async fn index_past_total_is_rejected_without_side_effects() {
    let h = Harness::new();
    h.coordinator.receive_fragment(fragment("clip4", 0, 3, b"A")).await.unwrap();
    let err = h.coordinator.receive_fragment(fragment("clip4", 3, 3, b"D")).await.unwrap_err();
    assert!(matches!(err, UploadException::InvalidFragment { index: Some(3), .. }));
    assert_eq!(err.upload_key(), Some("clip4"));
    let session = h.coordinator.info("clip4").await.unwrap();
    assert_eq!(session.received.iter().copied().collect::<Vec<_>>(), vec![0]);
}

#[tokio::test]
async fn fragments_after_completion_are_no_ops() {
    let h = Harness::new();
    h.coordinator.receive_fragment(fragment("clip5", 0, 1, b"solo")).await.unwrap();
    let repeat = h.coordinator.receive_fragment(fragment("clip5", 0, 1, b"other")).await.unwrap();
    assert_eq!(repeat.location(), Some(&h.dir.path().join("uploads").join("clip5")));
    assert_eq!(h.artifact("clip5").await, b"solo");
    assert!(!h.store.has_namespace("clip5").await.unwrap());
    assert_eq!(h.completions.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_last_fragments_reassemble_once() {
    let h = Harness::new();
    h.coordinator.receive_fragment(fragment("race", 0, 3, b"A")).await.unwrap();
    h.coordinator.receive_fragment(fragment("race", 1, 3, b"B")).await.unwrap();

    let handles = (0..8)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                coordinator.receive_fragment(fragment("race", 2, 3, b"C")).await
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        let progress = handle.await.unwrap().unwrap();
        assert!(progress.location().is_some());
    }

    assert_eq!(h.completions.len(), 1);
    assert_eq!(h.artifact("race").await, b"ABC");
    assert!(!h.store.has_namespace("race").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_fragments_complete_exactly_once() {
    let h = Harness::new();
    let mut order = (0..16u64).collect::<Vec<_>>();
    order.shuffle(&mut rand::thread_rng());

    let handles = order
        .into_iter()
        .map(|index| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                let payload = format!("[{index:02}]");
                coordinator.receive_fragment(fragment("burst", index, 16, payload.as_bytes())).await
            })
        })
        .collect::<Vec<_>>();
    let mut completed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().location().is_some() {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    let expected = (0..16).map(|i| format!("[{i:02}]")).collect::<String>();
    assert_eq!(h.artifact("burst").await, expected.as_bytes());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_uploads_proceed_independently() {
    let h = Harness::new();
    let handles = ["left", "right"]
        .into_iter()
        .map(|key| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move {
                for index in [2, 0, 1] {
                    let payload = format!("{key}{index}");
                    coordinator.receive_fragment(fragment(key, index, 3, payload.as_bytes())).await?;
                }
                UploadResult::Ok(())
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(h.artifact("left").await, b"left0left1left2");
    assert_eq!(h.artifact("right").await, b"right0right1right2");
}

/// Local store whose `put` fails a fixed number of times for one index.
struct FlakyChunkStore {
    inner: Arc<LocalChunkStoreImpl>,
    flaky_index: u64,
    failures_left: AtomicUsize,
}

#[async_trait]
impl ChunkStore for FlakyChunkStore {
    async fn put(&self, upload_key: &str, index: u64, payload: Vec<u8>) -> UploadResult<()> {
        if index == self.flaky_index
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(UploadException::Storage {
                upload_key: upload_key.to_owned(),
                index,
                source: anyhow::anyhow!("scratch space is full"),
            });
        }
        self.inner.put(upload_key, index, payload).await
    }

    async fn read_ordered(&self, upload_key: &str, total_fragments: u64) -> UploadResult<OrderedFragments> {
        self.inner.read_ordered(upload_key, total_fragments).await
    }

    async fn purge(&self, upload_key: &str) -> UploadResult<()> {
        self.inner.purge(upload_key).await
    }

    async fn has_namespace(&self, upload_key: &str) -> UploadResult<bool> {
        self.inner.has_namespace(upload_key).await
    }
}

#[tokio::test]
async fn storage_failure_on_completing_fragment_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalChunkStoreImpl::builder().base(dir.path().join("scratch")).build());
    let flaky = Arc::new(FlakyChunkStore {
        inner: store.clone(),
        flaky_index: 2,
        failures_left: AtomicUsize::new(1),
    });
    let h = Harness::with_store(dir, store, flaky);

    h.coordinator.receive_fragment(fragment("clip6", 0, 3, b"A")).await.unwrap();
    h.coordinator.receive_fragment(fragment("clip6", 1, 3, b"B")).await.unwrap();
    let err = h.coordinator.receive_fragment(fragment("clip6", 2, 3, b"C")).await.unwrap_err();
    assert!(matches!(err, UploadException::Storage { index: 2, .. }));
    assert!(err.is_retryable());

    let session = h.coordinator.info("clip6").await.unwrap();
    assert_eq!(session.status, UploadStatus::Receiving);
    assert_eq!(session.missing().collect::<Vec<_>>(), vec![2]);
    assert!(!h.artifact_exists("clip6").await);

    let retried = h.coordinator.receive_fragment(fragment("clip6", 2, 3, b"C")).await.unwrap();
    assert!(retried.location().is_some());
    assert_eq!(h.artifact("clip6").await, b"ABC");
}

#[tokio::test]
async fn missing_fragment_at_reassembly_keeps_scratch_and_allows_retrigger() {
    let reads = Arc::new(AtomicUsize::new(0));
    let mut store = MockChunkStore::new();
    store.expect_put().times(3).returning(|_, _, _| Ok(()));
    let counter = reads.clone();
    store.expect_read_ordered().times(2).returning(move |upload_key, _| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(UploadException::MissingFragment {
                upload_key: upload_key.to_owned(),
                index: 0,
            });
        }
        let fragments: Vec<UploadResult<Vec<u8>>> = vec![Ok(b"A".to_vec()), Ok(b"B".to_vec())];
        Ok(futures::stream::iter(fragments).boxed())
    });
    store.expect_purge().times(1).returning(|_| Ok(()));

    let dir = tempfile::tempdir().unwrap();
    let coordinator = UploadCoordinatorImpl::builder()
        .chunk_store(Arc::new(store))
        .destination(dir.path())
        .build();

    coordinator.receive_fragment(fragment("clip7", 1, 2, b"B")).await.unwrap();
    let err = coordinator.receive_fragment(fragment("clip7", 0, 2, b"A")).await.unwrap_err();
    assert!(matches!(err, UploadException::MissingFragment { index: 0, .. }));
    assert_eq!(coordinator.info("clip7").await.unwrap().status, UploadStatus::Failed);
    assert!(!tokio::fs::try_exists(dir.path().join("clip7")).await.unwrap());

    let progress = coordinator.receive_fragment(fragment("clip7", 0, 2, b"A")).await.unwrap();
    assert!(progress.location().is_some());
    assert_eq!(tokio::fs::read(dir.path().join("clip7")).await.unwrap(), b"AB");
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn assembly_write_failure_preserves_scratch() {
    let h = Harness::new();
    // A regular file where the artifact directory should be.
    tokio::fs::write(h.dir.path().join("uploads"), b"").await.unwrap();

    h.coordinator.receive_fragment(fragment("clip8", 0, 2, b"A")).await.unwrap();
    let err = h.coordinator.receive_fragment(fragment("clip8", 1, 2, b"B")).await.unwrap_err();
    assert!(matches!(err, UploadException::AssemblyWrite { .. }));
    assert!(h.store.has_namespace("clip8").await.unwrap());
    assert_eq!(h.coordinator.info("clip8").await.unwrap().status, UploadStatus::Failed);

    tokio::fs::remove_file(h.dir.path().join("uploads")).await.unwrap();
    let progress = h.coordinator.receive_fragment(fragment("clip8", 1, 2, b"B")).await.unwrap();
    assert!(progress.location().is_some());
    assert_eq!(h.artifact("clip8").await, b"AB");
    assert!(!h.store.has_namespace("clip8").await.unwrap());
}

#[tokio::test]
async fn declared_hash_is_verified() {
    let h = Harness::new();
    let hash = blake3::hash(b"goal!").to_string();

    let mut first = fragment("clip9", 0, 2, b"go");
    first.hash = Some(hash.to_lowercase());
    h.coordinator.receive_fragment(first).await.unwrap();
    h.coordinator.receive_fragment(fragment("clip9", 1, 2, b"al!")).await.unwrap();
    assert_eq!(h.artifact("clip9").await, b"goal!");
    let event = h.completions.recv_async().await.unwrap();
    assert_eq!(event.hash, hash.to_uppercase());
    assert_eq!(event.size, 5);
}

#[tokio::test]
async fn hash_mismatch_fails_without_publishing() {
    let h = Harness::new();
    let mut first = fragment("clip10", 0, 2, b"go");
    first.hash = Some(blake3::hash(b"goal!").to_string());
    h.coordinator.receive_fragment(first).await.unwrap();

    let mut conflicting = fragment("clip10", 1, 2, b"al!");
    conflicting.hash = Some("ABCDEF".to_owned());
    let err = h.coordinator.receive_fragment(conflicting).await.unwrap_err();
    assert!(matches!(err, UploadException::InvalidFragment { index: Some(1), .. }));

    let err = h.coordinator.receive_fragment(fragment("clip10", 1, 2, b"al?")).await.unwrap_err();
    assert!(matches!(err, UploadException::UnmatchedHash { .. }));
    assert!(!h.artifact_exists("clip10").await);
    assert!(h.store.has_namespace("clip10").await.unwrap());

    let mut entries = tokio::fs::read_dir(h.dir.path().join("uploads")).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());

    let progress = h.coordinator.receive_fragment(fragment("clip10", 1, 2, b"al!")).await.unwrap();
    assert!(progress.location().is_some());
}

#[tokio::test]
async fn remove_cancels_a_session() {
    let h = Harness::new();
    h.coordinator.receive_fragment(fragment("clip11", 0, 3, b"A")).await.unwrap();
    h.coordinator.remove("clip11").await.unwrap();

    assert!(!h.store.has_namespace("clip11").await.unwrap());
    let err = h.coordinator.info("clip11").await.unwrap_err();
    assert!(matches!(err, UploadException::SessionNotFound { .. }));
    h.coordinator.remove("clip11").await.unwrap();

    // The key can be reused with a different declaration afterwards.
    let progress = h.coordinator.receive_fragment(fragment("clip11", 0, 1, b"fresh")).await.unwrap();
    assert!(progress.location().is_some());
    assert_eq!(h.artifact("clip11").await, b"fresh");
}

#[tokio::test]
async fn longest_accepted_key_assembles() {
    let h = Harness::new();
    let key = "k".repeat(MAX_UPLOAD_KEY_LEN);
    h.coordinator.receive_fragment(fragment(&key, 1, 2, b"B")).await.unwrap();
    let done = h.coordinator.receive_fragment(fragment(&key, 0, 2, b"A")).await.unwrap();
    assert!(matches!(done, UploadProgress::Completed { .. }));
    assert_eq!(h.artifact(&key).await, b"AB");
}

#[tokio::test]
async fn oversized_fragment_count_is_rejected() {
    let h = Harness::new();
    let err = h.coordinator.receive_fragment(fragment("big", 0, 1 << 40, b"A")).await.unwrap_err();
    assert!(matches!(err, UploadException::InvalidFragment { .. }));
    assert!(matches!(
        h.coordinator.info("big").await,
        Err(UploadException::SessionNotFound { .. })
    ));
    assert!(!h.store.has_namespace("big").await.unwrap());
}

/// Local store holding back the first `put` until the gate opens.
struct GatedChunkStore {
    inner: Arc<LocalChunkStoreImpl>,
    gate: Notify,
    held: AtomicBool,
}

#[async_trait]
impl ChunkStore for GatedChunkStore {
    async fn put(&self, upload_key: &str, index: u64, payload: Vec<u8>) -> UploadResult<()> {
        if !self.held.swap(true, Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.inner.put(upload_key, index, payload).await
    }

    async fn read_ordered(&self, upload_key: &str, total_fragments: u64) -> UploadResult<OrderedFragments> {
        self.inner.read_ordered(upload_key, total_fragments).await
    }

    async fn purge(&self, upload_key: &str) -> UploadResult<()> {
        self.inner.purge(upload_key).await
    }

    async fn has_namespace(&self, upload_key: &str) -> UploadResult<bool> {
        self.inner.has_namespace(upload_key).await
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn fragment_arriving_during_remove_starts_a_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalChunkStoreImpl::builder().base(dir.path().join("scratch")).build());
    let gated = Arc::new(GatedChunkStore {
        inner: store.clone(),
        gate: Notify::new(),
        held: AtomicBool::new(false),
    });
    let h = Harness::with_store(dir, store, gated.clone());

    let coordinator = h.coordinator.clone();
    let in_flight =
        tokio::spawn(async move { coordinator.receive_fragment(fragment("clip12", 0, 2, b"A")).await });
    settle().await;
    let coordinator = h.coordinator.clone();
    let removal = tokio::spawn(async move { coordinator.remove("clip12").await });
    settle().await;
    let coordinator = h.coordinator.clone();
    let late = tokio::spawn(async move { coordinator.receive_fragment(fragment("clip12", 1, 2, b"B")).await });
    settle().await;
    assert!(!removal.is_finished());
    assert!(!late.is_finished());

    gated.gate.notify_one();
    in_flight.await.unwrap().unwrap();
    removal.await.unwrap().unwrap();
    let late = late.await.unwrap().unwrap();
    assert!(matches!(late, UploadProgress::Accepted { received: 1, total: 2, .. }));

    // Fragment 0 went with the removed session, fragment 1 belongs to the new one.
    let session = h.coordinator.info("clip12").await.unwrap();
    assert_eq!(session.missing().collect::<Vec<_>>(), vec![0]);
    assert!(h.store.has_namespace("clip12").await.unwrap());
    assert!(matches!(
        h.store.read_ordered("clip12", 2).await.err(),
        Some(UploadException::MissingFragment { index: 0, .. })
    ));
}
