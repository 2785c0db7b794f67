//! AWS SDK configuration
//!
//! Builds the DynamoDB client used by the DynamoDB storage backend,
//! supporting custom endpoints for DynamoDB Local and LocalStack.

use aws_config::{meta::region::RegionProviderChain, BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;

use crate::config::Settings;

/// Load the base AWS SDK configuration (region + default credential chain)
pub async fn build_aws_config(settings: &Settings) -> SdkConfig {
    let region_provider = RegionProviderChain::first_try(Region::new(settings.aws_region.clone()))
        .or_default_provider();

    aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await
}

/// Create a DynamoDB client with optional custom endpoint
///
/// If `DYNAMODB_ENDPOINT_URL` is set in settings, the client will use
/// that endpoint instead of the regional one.
pub async fn create_dynamodb_client(settings: &Settings) -> DynamoDbSdkClient {
    let sdk_config = build_aws_config(settings).await;

    match &settings.dynamodb_endpoint_url {
        Some(endpoint_url) => {
            tracing::info!(endpoint = %endpoint_url, "Using custom DynamoDB endpoint");

            let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint_url)
                .build();

            DynamoDbSdkClient::from_conf(dynamodb_config)
        }
        None => DynamoDbSdkClient::new(&sdk_config),
    }
}
