use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use domain_upload::{
    exception::{UploadException, UploadResult},
    service::{ChunkStore, OrderedFragments},
};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Chunk store keeping every fragment as a file: `<base>/<upload_key>/<index>`.
#[derive(TypedBuilder, Clone)]
pub struct LocalChunkStoreImpl {
    #[builder(default = "scratch".into(), setter(into))]
    base: PathBuf,
}

impl LocalChunkStoreImpl {
    fn namespace_dir(&self, upload_key: &str) -> PathBuf {
        self.base.join(upload_key)
    }

    fn part_path(&self, upload_key: &str, index: u64) -> PathBuf {
        self.namespace_dir(upload_key).join(index.to_string())
    }

    fn staging_path(&self, upload_key: &str, index: u64) -> PathBuf {
        self.namespace_dir(upload_key).join(format!(".{index}.{}.tmp", Uuid::new_v4()))
    }
}

/// Writes next to the target and renames over it, so readers never see a
/// partially written fragment.
async fn write_replacing(staging: &Path, target: &Path, content: &[u8]) -> anyhow::Result<()> {
    let dir = target.parent().with_context(|| format!("path: {target:?} doesn't has parent."))?;
    tokio::fs::create_dir_all(dir).await?;
    let mut file = tokio::fs::File::create(staging).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(staging, target).await?;
    Ok(())
}

#[async_trait]
impl ChunkStore for LocalChunkStoreImpl {
    async fn put(&self, upload_key: &str, index: u64, payload: Vec<u8>) -> UploadResult<()> {
        let target = self.part_path(upload_key, index);
        let staging = self.staging_path(upload_key, index);
        if let Err(e) = write_replacing(&staging, &target, &payload).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(UploadException::Storage {
                upload_key: upload_key.to_owned(),
                index,
                source: e.context(format!("writing {target:?}")),
            });
        }
        Ok(())
    }

    async fn read_ordered(
        &self,
        upload_key: &str,
        total_fragments: u64,
    ) -> UploadResult<OrderedFragments> {
        let mut paths = Vec::with_capacity(total_fragments as usize);
        for index in 0..total_fragments {
            let path = self.part_path(upload_key, index);
            let exists = tokio::fs::try_exists(&path)
                .await
                .with_context(|| format!("probing {path:?}"))?;
            if !exists {
                return Err(UploadException::MissingFragment {
                    upload_key: upload_key.to_owned(),
                    index,
                });
            }
            paths.push((index, path));
        }

        let upload_key = upload_key.to_owned();
        let fragments = futures::stream::iter(paths).then(move |(index, path)| {
            let upload_key = upload_key.clone();
            async move {
                tokio::fs::read(&path).await.map_err(|e| match e.kind() {
                    ErrorKind::NotFound => UploadException::MissingFragment { upload_key, index },
                    _ => UploadException::Storage {
                        upload_key,
                        index,
                        source: anyhow::Error::new(e).context(format!("reading {path:?}")),
                    },
                })
            }
        });
        Ok(fragments.boxed())
    }

    async fn purge(&self, upload_key: &str) -> UploadResult<()> {
        let dir = self.namespace_dir(upload_key);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!("removing {dir:?}")).into()),
        }
    }

    async fn has_namespace(&self, upload_key: &str) -> UploadResult<bool> {
        let dir = self.namespace_dir(upload_key);
        Ok(tokio::fs::try_exists(&dir).await.with_context(|| format!("probing {dir:?}"))?)
    }
}
