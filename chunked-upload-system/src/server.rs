use std::sync::Arc;

use actix_easy_multipart::MultipartFormConfig;
use colored::Colorize;
use domain_upload::service::UploadCoordinatorService;
use service_upload::{LocalChunkStoreImpl, UploadCoordinatorImpl};
use tracing::{error, info};

use crate::api;
use crate::background::log_completions;
use crate::config::{build_config, UploadSystemConfig};
use crate::telemetry::initialize_telemetry;

pub fn run() {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(x) => x,
        Err(e) => {
            return eprintln!("{}: {}", "Cannot build runtime".red(), e);
        }
    };
    runtime.block_on(async_run());
}

pub async fn async_run() {
    let config = match build_config() {
        Ok(x) => x,
        Err(e) => {
            return eprintln!("{}: {}", "Cannot build config".red(), e);
        }
    };
    if let Err(e) = initialize_telemetry(config.telemetry()) {
        return eprintln!("{}: {}", "Cannot build logger".red(), e);
    };

    let (completion_sender, completion_receiver) = flume::unbounded();
    let chunk_store = LocalChunkStoreImpl::builder()
        .base(config.file_system().scratch_base())
        .build();
    let coordinator: Arc<dyn UploadCoordinatorService> = Arc::new(
        UploadCoordinatorImpl::builder()
            .chunk_store(Arc::new(chunk_store))
            .destination(config.file_system().artifact_base())
            .completion_sender(completion_sender)
            .build(),
    );
    let listener = tokio::spawn(log_completions(completion_receiver));

    tokio::select! {
        result = initialize_web_host(&config, coordinator) => {
            if let Err(e) = result {
                error!("web host stopped: {e:#}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping services (ctrl-c handling).");
        }
    }
    listener.abort();
}

pub async fn initialize_web_host(
    config: &UploadSystemConfig,
    coordinator: Arc<dyn UploadCoordinatorService>,
) -> anyhow::Result<()> {
    let host = config.host();
    let total_limit = *config.file_system().multipart_total_limit();
    info!(
        "Listening on {}:{}, scratch: {}, uploads: {}",
        host.bind_address(),
        host.bind_port(),
        config.file_system().scratch_base(),
        config.file_system().artifact_base()
    );
    actix_web::HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_header()
            .allow_any_method()
            .max_age(86400);

        actix_web::App::new()
            .wrap(cors)
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(MultipartFormConfig::default().total_limit(total_limit))
            .app_data(actix_web::web::Data::from(coordinator.clone()))
            .service(api::upload::partial_upload)
            .service(api::upload::get_partial_upload_info)
            .service(api::upload::cancel_partial_upload)
    })
    .bind((host.bind_address().as_str(), *host.bind_port()))?
    .run()
    .await?;
    Ok(())
}
