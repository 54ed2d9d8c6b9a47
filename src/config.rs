use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Bucket holding uploaded snap images.
    pub images_bucket: String,
    /// Base URL of the object storage; public images resolve as
    /// `<storage_base>/object/public/<bucket>/<path>`.
    pub storage_base: String,
    /// Reverse-geocode endpoint (Nominatim-style `reverse` resource).
    pub geocoder_endpoint: String,
    /// Client label sent as the User-Agent on geocode lookups.
    pub geocoder_client_label: String,
    // Store region as string for simplicity here, aws_clients can convert
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let images_bucket = env::var("IMAGES_BUCKET")
            .map_err(|_| ConfigError::MissingVar("IMAGES_BUCKET".into()))?;

        let storage_base = env::var("STORAGE_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("STORAGE_BASE_URL".into()))?;

        let geocoder_endpoint = env::var("GEOCODER_ENDPOINT")
            .unwrap_or_else(|_| "https://nominatim.openstreetmap.org/reverse".to_string());
        reqwest::Url::parse(&geocoder_endpoint)
            .map_err(|e| ConfigError::InvalidVar("GEOCODER_ENDPOINT".into(), e.to_string()))?;

        let geocoder_client_label =
            env::var("GEOCODER_CLIENT_LABEL").unwrap_or_else(|_| "snaphood/1.0".to_string());

        let aws_region =
            env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "ca-central-1".to_string());

        // Allow overriding endpoint for localstack/testing
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok();

        Ok(Config {
            images_bucket,
            storage_base,
            geocoder_endpoint,
            geocoder_client_label,
            aws_region,
            localstack_endpoint,
        })
    }
}
