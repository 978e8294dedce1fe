use domain_upload::model::vo::UploadCompleted;
use tracing::info;

/// Drains completion signals until every sender is gone.
///
/// This is where a downstream consumer of assembled files gets notified.
pub async fn log_completions(receiver: flume::Receiver<UploadCompleted>) {
    while let Ok(completed) = receiver.recv_async().await {
        info!(
            upload_key = %completed.upload_key,
            location = ?completed.location,
            size = completed.size,
            hash = %completed.hash,
            "assembled file ready"
        );
    }
}
