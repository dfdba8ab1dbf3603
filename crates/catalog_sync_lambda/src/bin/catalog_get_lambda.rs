use std::sync::Arc;

use catalog_sync_lambda::adapters::secrets::SecretsManagerSource;
use catalog_sync_lambda::config::CatalogConfig;
use catalog_sync_lambda::context::CatalogContext;
use catalog_sync_lambda::handlers::get::handle_get_event;
use catalog_sync_lambda::handlers::response::ApiGatewayResponse;
use catalog_sync_lambda::telemetry::init_tracing;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(
    context: &CatalogContext,
    event: LambdaEvent<Value>,
) -> Result<ApiGatewayResponse, Error> {
    let response = handle_get_event(&event.payload, &context.reader()).await;
    context.observe(&response).await;
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = CatalogConfig::from_env().map_err(|error| Error::from(error.to_string()))?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let context = Arc::new(CatalogContext::new(
        config,
        Arc::new(SecretsManagerSource::new(&aws_config)),
    ));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let context = context.clone();
        async move { handle_request(&context, event).await }
    }))
    .await
}
