use actix_easy_multipart::MultipartForm;
use actix_web::{get, post, web, web::Path};
use anyhow::Context;
use domain_upload::{
    command::ReceiveFragmentCommand, exception::UploadException, model::vo::UploadProgress,
    service::UploadCoordinatorService,
};

use crate::api::{
    dtos::{PartialUploadInfoResponse, PartialUploadRequest},
    respond, ApiResult,
};

/// Receive one fragment.
#[post("/file-storage/PartialUpload")]
pub async fn partial_upload(
    coordinator: web::Data<dyn UploadCoordinatorService>,
    data: MultipartForm<PartialUploadRequest>,
) -> ApiResult<UploadProgress> {
    let data = data.0;
    let upload_key = data.upload_key.0;
    let index = data.index.0;
    if data.bin.len() != 1 {
        return Err(UploadException::invalid(
            &upload_key,
            Some(index),
            "exactly one file is expected in `bin`",
        )
        .into());
    }
    let mut bin = data.bin;
    let content = bin.remove(0);
    let payload = tokio::fs::read(content.file.path())
        .await
        .context("reading uploaded fragment")
        .map_err(UploadException::from)?;

    let progress = coordinator
        .receive_fragment(ReceiveFragmentCommand {
            upload_key,
            index,
            total_fragments: data.total_fragments.0,
            hash: data.hash.map(|h| h.0),
            payload,
        })
        .await?;
    respond(progress)
}

#[get("/file-storage/PartialUploadInfo/{upload_key}")]
pub async fn get_partial_upload_info(
    coordinator: web::Data<dyn UploadCoordinatorService>,
    upload_key: Path<String>,
) -> ApiResult<PartialUploadInfoResponse> {
    let session = coordinator.info(&upload_key).await?;
    respond(session.into())
}

#[post("/file-storage/CancelPartialUpload/{upload_key}")]
pub async fn cancel_partial_upload(
    coordinator: web::Data<dyn UploadCoordinatorService>,
    upload_key: Path<String>,
) -> ApiResult<()> {
    coordinator.remove(&upload_key).await?;
    respond(())
}
