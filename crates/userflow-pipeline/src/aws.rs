use crate::config::ConfigSource;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_REGION: &str = "eu-west-1";

/// Connection settings shared by the S3, SNS and DynamoDB clients.
///
/// Static credentials are used only when both keys are present; otherwise
/// the default provider chain applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsSettings {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl AwsSettings {
    pub fn from_source(source: &ConfigSource) -> Self {
        let endpoint = source.env_value("AWS_ENDPOINT_URL");
        let path_style = source
            .env_value("S3_PATH_STYLE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(endpoint.is_some());

        Self {
            region: source
                .env_value("AWS_REGION")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: source.env_value("AWS_ACCESS_KEY_ID"),
            secret_key: source.env_value("AWS_SECRET_ACCESS_KEY"),
            endpoint,
            path_style,
        }
    }

    pub fn for_localstack(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_REGION.to_string(),
            access_key: Some("test".to_string()),
            secret_key: Some("test".to_string()),
            path_style: true,
        }
    }

    pub async fn load(&self) -> SdkConfig {
        debug!("Loading AWS config: {:?}", self.redacted());

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()));

        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        if let (Some(access_key), Some(secret_key)) = (&self.access_key, &self.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "userflow",
            ));
        }

        loader.load().await
    }

    pub fn s3_client(&self, sdk: &SdkConfig) -> aws_sdk_s3::Client {
        let config = aws_sdk_s3::config::Builder::from(sdk)
            .force_path_style(self.path_style)
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    pub fn sns_client(&self, sdk: &SdkConfig) -> aws_sdk_sns::Client {
        aws_sdk_sns::Client::new(sdk)
    }

    pub fn dynamodb_client(&self, sdk: &SdkConfig) -> aws_sdk_dynamodb::Client {
        aws_sdk_dynamodb::Client::new(sdk)
    }

    fn redacted(&self) -> Self {
        Self {
            secret_key: self.secret_key.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }
}
