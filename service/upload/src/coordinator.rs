use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use domain_upload::{
    command::{validate_upload_key, ReceiveFragmentCommand},
    exception::{UploadException, UploadResult},
    model::{
        entity::UploadSession,
        vo::{UploadCompleted, UploadProgress, UploadStatus},
    },
    service::{ChunkStore, OrderedFragments, UploadCoordinatorService},
};
use futures::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    sync::{Mutex, OwnedMutexGuard},
};
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Coordinates fragment reception and reassembly.
///
/// Every upload key owns its own session mutex, which serializes the
/// fragment writes, the bookkeeping and the completion check of that upload
/// only. A handler losing the completion race waits on the mutex and then
/// finds the session done.
///
/// A slot only counts while it is the one registered for its key. `remove`
/// unregisters a slot while holding its lock, so handlers queued on it
/// notice and start over on a fresh slot.
#[derive(TypedBuilder)]
pub struct UploadCoordinatorImpl {
    chunk_store: Arc<dyn ChunkStore>,
    /// Directory receiving assembled files.
    #[builder(setter(into))]
    destination: PathBuf,
    #[builder(default, setter(strip_option))]
    completion_sender: Option<flume::Sender<UploadCompleted>>,
    #[builder(default)]
    sessions: DashMap<String, Arc<Mutex<UploadSession>>>,
}

impl UploadCoordinatorImpl {
    fn session_slot(&self, cmd: &ReceiveFragmentCommand) -> Arc<Mutex<UploadSession>> {
        self.sessions
            .entry(cmd.upload_key.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(UploadSession::new(
                    &cmd.upload_key,
                    cmd.total_fragments,
                    None,
                )))
            })
            .value()
            .clone()
    }

    fn is_registered(&self, upload_key: &str, slot: &Arc<Mutex<UploadSession>>) -> bool {
        self.sessions
            .get(upload_key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Locks the session registered for the fragment's upload, creating it
    /// on first use.
    async fn lock_session(&self, cmd: &ReceiveFragmentCommand) -> OwnedMutexGuard<UploadSession> {
        loop {
            let slot = self.session_slot(cmd);
            let session = slot.clone().lock_owned().await;
            if self.is_registered(&cmd.upload_key, &slot) {
                return session;
            }
            debug!("session was removed while waiting, starting over");
        }
    }

    fn artifact_path(&self, upload_key: &str) -> PathBuf {
        self.destination.join(upload_key)
    }

    /// Reads every fragment in order and publishes the assembled file.
    async fn reassemble(&self, session: &UploadSession) -> UploadResult<UploadCompleted> {
        let upload_key = session.upload_key.as_str();
        let fragments = self.chunk_store.read_ordered(upload_key, session.total_fragments).await?;

        let staging = self.destination.join(format!(".{}.assembling", Uuid::new_v4()));
        let written = self.write_staging(upload_key, &staging, fragments).await;
        let (size, hash) = match written {
            Ok(x) => x,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        if let Some(provided_hash) = &session.hash {
            if provided_hash.ne(&hash) {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(UploadException::UnmatchedHash {
                    upload_key: upload_key.to_owned(),
                    provided_hash: provided_hash.to_owned(),
                    completed_hash: hash,
                });
            }
        }

        let location = self.artifact_path(upload_key);
        if let Err(e) = tokio::fs::rename(&staging, &location).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(UploadException::AssemblyWrite {
                upload_key: upload_key.to_owned(),
                source: anyhow::Error::new(e).context(format!("publishing {location:?}")),
            });
        }

        Ok(UploadCompleted {
            upload_key: upload_key.to_owned(),
            location,
            size,
            hash,
        })
    }

    /// Streams fragments into the staging file, one fragment in memory at a time.
    async fn write_staging(
        &self,
        upload_key: &str,
        staging: &Path,
        mut fragments: OrderedFragments,
    ) -> UploadResult<(u64, String)> {
        let assembly_write = |e: anyhow::Error| UploadException::AssemblyWrite {
            upload_key: upload_key.to_owned(),
            source: e,
        };
        tokio::fs::create_dir_all(&self.destination)
            .await
            .with_context(|| format!("creating {:?}", self.destination))
            .map_err(assembly_write)?;
        let mut file = tokio::fs::File::create(staging)
            .await
            .with_context(|| format!("creating {staging:?}"))
            .map_err(assembly_write)?;

        let mut hasher = blake3::Hasher::new();
        let mut size = 0u64;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            file.write_all(&fragment)
                .await
                .with_context(|| format!("writing {staging:?}"))
                .map_err(assembly_write)?;
            hasher.update(&fragment);
            size += fragment.len() as u64;
        }
        file.sync_all()
            .await
            .with_context(|| format!("flushing {staging:?}"))
            .map_err(assembly_write)?;

        Ok((size, hasher.finalize().to_string().to_uppercase()))
    }

    async fn notify(&self, completed: &UploadCompleted) {
        if let Some(sender) = &self.completion_sender {
            if let Err(e) = sender.send_async(completed.clone()).await {
                warn!(upload_key = %completed.upload_key, "completion signal dropped: {e}");
            }
        }
    }
}

#[async_trait]
impl UploadCoordinatorService for UploadCoordinatorImpl {
    #[tracing::instrument(skip_all, fields(upload_key = %cmd.upload_key, index = cmd.index))]
    async fn receive_fragment(&self, cmd: ReceiveFragmentCommand) -> UploadResult<UploadProgress> {
        cmd.validate()?;
        let mut session = self.lock_session(&cmd).await;

        if !session.status.accepts_fragments() {
            if let Some(location) = &session.artifact {
                debug!("upload already assembled, fragment ignored");
                return Ok(UploadProgress::Completed {
                    upload_key: cmd.upload_key,
                    location: location.to_owned(),
                });
            }
        }
        let first_stored = session.received.is_empty();
        if !first_stored && session.total_fragments != cmd.total_fragments {
            return Err(UploadException::invalid(
                &cmd.upload_key,
                Some(cmd.index),
                format!(
                    "total fragments {} conflicts with declared {}",
                    cmd.total_fragments, session.total_fragments
                ),
            ));
        }
        let provided_hash = cmd.normalized_hash();
        if let (Some(hash), Some(declared)) = (&provided_hash, &session.hash) {
            if declared.ne(hash) {
                return Err(UploadException::invalid(
                    &cmd.upload_key,
                    Some(cmd.index),
                    format!("hash {hash} conflicts with declared {declared}"),
                ));
            }
        }

        let index = cmd.index;
        if let Err(e) = self.chunk_store.put(&cmd.upload_key, index, cmd.payload).await {
            warn!("storing fragment failed: {e}");
            return Err(e);
        }
        if first_stored {
            session.total_fragments = cmd.total_fragments;
        }
        session.mark_received(index);
        if session.hash.is_none() {
            session.hash = provided_hash;
        }

        if !session.is_complete() {
            debug!(
                received = session.received_count(),
                total = session.total_fragments,
                "fragment accepted"
            );
            return Ok(UploadProgress::Accepted {
                upload_key: cmd.upload_key,
                index,
                received: session.received_count(),
                total: session.total_fragments,
            });
        }

        session.set_status(UploadStatus::Complete);
        session.set_status(UploadStatus::Reassembling);
        let completed = match self.reassemble(&session).await {
            Ok(x) => x,
            Err(e) => {
                error!("reassembly failed, scratch kept for retry: {e}");
                session.set_status(UploadStatus::Failed);
                return Err(e);
            }
        };

        session.artifact = Some(completed.location.to_owned());
        session.set_status(UploadStatus::Done);
        if let Err(e) = self.chunk_store.purge(&cmd.upload_key).await {
            error!("purging scratch after reassembly failed: {e}");
        }
        info!(
            location = ?completed.location,
            size = completed.size,
            "upload assembled"
        );
        self.notify(&completed).await;

        Ok(UploadProgress::Completed {
            upload_key: cmd.upload_key,
            location: completed.location,
        })
    }

    async fn info(&self, upload_key: &str) -> UploadResult<UploadSession> {
        let slot = self
            .sessions
            .get(upload_key)
            .map(|el| el.value().clone())
            .ok_or(UploadException::SessionNotFound {
                upload_key: upload_key.to_owned(),
            })?;
        let session = slot.lock().await;
        Ok(session.clone())
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, upload_key: &str) -> UploadResult<()> {
        validate_upload_key(upload_key)?;
        let slot = self.sessions.get(upload_key).map(|el| el.value().clone());
        // The slot stays registered until scratch is gone, so new fragments
        // queue behind this lock instead of writing into the namespace.
        let guard = match &slot {
            Some(slot) => Some(slot.lock().await),
            None => None,
        };
        self.chunk_store.purge(upload_key).await?;
        if let Some(slot) = &slot {
            self.sessions.remove_if(upload_key, |_, current| Arc::ptr_eq(current, slot));
        }
        drop(guard);
        info!(known = slot.is_some(), "upload session removed");
        Ok(())
    }
}
