//! Development/LocalStack provisioning. A managed deployment creates these
//! resources out of band; nothing in the sync pipeline calls this.

use crate::errors::AppError;
use crate::repositories::{COMMENTS_TABLE, PROFILES_TABLE, SNAPS_TABLE};
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};
use tracing;

/// Creates one table if it doesn't exist. Every table here keys on a plain
/// string `id`.
async fn create_table_if_not_exists(
    client: &DynamoDbClient,
    table_name: &str,
) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table_name)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name("id")
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| AppError::Init(format!("Failed to build attribute definition: {e}")))?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name("id")
                .key_type(KeyType::Hash)
                .build()
                .map_err(|e| AppError::Init(format!("Failed to build key schema: {e}")))?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;
    match result {
        Ok(_) => {
            tracing::info!("Startup: Table '{}' created successfully or setup initiated.", table_name);
            Ok(())
        }
        Err(e) => {
            if let DynamoSdkError::ServiceError(service_err) = &e {
                if service_err.err().is_resource_in_use_exception() {
                    tracing::info!("Startup: Table '{}' already exists, no action needed.", table_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating DynamoDB table '{table_name}'");
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::Init(format!("{context}: {e}")))
                }
            } else {
                let context = format!("Startup: SDK error creating DynamoDB table '{table_name}'");
                tracing::error!("{}: {}", context, e);
                Err(AppError::Init(format!("{context}: {e}")))
            }
        }
    }
}

/// Ensures the images bucket exists, creating it with the correct location
/// constraint if needed.
async fn ensure_bucket_exists(
    client: &S3Client,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), AppError> {
    let bucket_config = if region_str != "us-east-1" {
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region_str))
                .build(),
        )
    } else {
        None
    };

    let mut create_bucket_req_builder = client.create_bucket().bucket(bucket_name);
    if let Some(config) = bucket_config {
        create_bucket_req_builder = create_bucket_req_builder.create_bucket_configuration(config);
    }

    match create_bucket_req_builder.send().await {
        Ok(_) => {
            tracing::info!("Startup: Bucket '{}' created or already exists.", bucket_name);
            Ok(())
        }
        Err(sdk_err) => {
            if let S3SdkError::ServiceError(service_err) = &sdk_err {
                let code = service_err.err().meta().code();
                if code == Some("BucketAlreadyOwnedByYou") || code == Some("BucketAlreadyExists") {
                    tracing::info!("Startup: Bucket '{}' already exists.", bucket_name);
                    Ok(())
                } else {
                    let context = format!("Startup: Service error creating bucket '{bucket_name}'");
                    tracing::error!("{}: {:?}", context, service_err);
                    Err(AppError::Init(format!("{context}: {sdk_err}")))
                }
            } else {
                let context = format!("Startup: SDK error creating bucket '{bucket_name}'");
                tracing::error!("{}: {}", context, sdk_err);
                Err(AppError::Init(format!("{context}: {sdk_err}")))
            }
        }
    }
}

/// Initializes backend resources (the three tables and the images bucket).
pub async fn init_resources(
    db_client: &DynamoDbClient,
    s3_client: &S3Client,
    bucket_name: &str,
    region_str: &str,
) -> Result<(), AppError> {
    tracing::info!("Startup: Initializing backend resources...");
    for table in [SNAPS_TABLE, COMMENTS_TABLE, PROFILES_TABLE] {
        create_table_if_not_exists(db_client, table).await?;
    }
    ensure_bucket_exists(s3_client, bucket_name, region_str).await?;
    tracing::info!("Startup: Backend resource initialization complete.");
    Ok(())
}
