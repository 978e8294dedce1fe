use crate::{
    command::ReceiveFragmentCommand,
    exception::UploadResult,
    model::{entity::UploadSession, vo::UploadProgress},
    service::{ChunkStore, OrderedFragments, UploadCoordinatorService},
};
use async_trait::async_trait;
use mockall::mock;

mock! {
    pub ChunkStore {}
    #[async_trait]
    impl ChunkStore for ChunkStore {
        async fn put(&self, upload_key: &str, index: u64, payload: Vec<u8>) -> UploadResult<()>;
        async fn read_ordered(
            &self,
            upload_key: &str,
            total_fragments: u64,
        ) -> UploadResult<OrderedFragments>;
        async fn purge(&self, upload_key: &str) -> UploadResult<()>;
        async fn has_namespace(&self, upload_key: &str) -> UploadResult<bool>;
    }
}

mock! {
    pub UploadCoordinatorService {}
    #[async_trait]
    impl UploadCoordinatorService for UploadCoordinatorService {
        async fn receive_fragment(&self, cmd: ReceiveFragmentCommand) -> UploadResult<UploadProgress>;
        async fn info(&self, upload_key: &str) -> UploadResult<UploadSession>;
        async fn remove(&self, upload_key: &str) -> UploadResult<()>;
    }
}
