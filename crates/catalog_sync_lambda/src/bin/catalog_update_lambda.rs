use std::sync::Arc;

use catalog_sync_lambda::adapters::object_store::S3ArchiveStore;
use catalog_sync_lambda::adapters::secrets::SecretsManagerSource;
use catalog_sync_lambda::config::CatalogConfig;
use catalog_sync_lambda::context::CatalogContext;
use catalog_sync_lambda::handlers::response::ApiGatewayResponse;
use catalog_sync_lambda::handlers::update::handle_update_event;
use catalog_sync_lambda::telemetry::init_tracing;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(
    context: &CatalogContext,
    event: LambdaEvent<Value>,
) -> Result<ApiGatewayResponse, Error> {
    let archive = context
        .archive()
        .ok_or_else(|| Error::from("archive store must be attached"))?;
    let response = handle_update_event(
        event.payload,
        &context.writer(),
        archive,
        &context.config().archive_prefix,
    )
    .await;
    context.observe(&response).await;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = CatalogConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let bucket = config
        .archive_bucket
        .clone()
        .ok_or_else(|| Error::from("CATALOG_BUCKET_NAME must be configured"))?;

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let context = Arc::new(
        CatalogContext::new(config, Arc::new(SecretsManagerSource::new(&aws_config)))
            .with_archive(Arc::new(S3ArchiveStore::new(&aws_config, bucket))),
    );

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let context = context.clone();
        async move { handle_request(&context, event).await }
    }))
    .await
}
