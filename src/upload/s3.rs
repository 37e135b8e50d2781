use super::ObjectStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{meta::region::RegionProviderChain, BehaviorVersion};
use aws_sdk_s3::{config::Region, primitives::ByteStream, Client};
use std::path::Path;
use tracing::{debug, info};

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// S3-compatible store; points at a lakeFS gateway when given an endpoint.
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Build a client from the default AWS credential chain
    /// (`AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`, profiles, ...).
    ///
    /// Path-style addressing is forced: the lakeFS gateway serves repositories
    /// as `https://host/<repo>/<branch>/...`, not as virtual hosts.
    pub async fn connect(endpoint: Option<&str>, region: Option<&str>) -> Result<Self> {
        let region = match region {
            Some(r) => RegionProviderChain::first_try(Region::new(r.to_owned())),
            None => RegionProviderChain::default_provider(),
        }
        .or_else("us-east-1");

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk = loader.load().await;

        let conf = aws_sdk_s3::config::Builder::from(&sdk)
            .force_path_style(true)
            .build();
        info!(endpoint = ?endpoint, region = ?sdk.region(), "object store client ready");
        Ok(Self::from_client(Client::from_conf(conf)))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_not_found() => Ok(false),
                _ => Err(err).with_context(|| format!("checking {}/{}", bucket, key)),
            },
        }
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64> {
        let len = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("opening {} for upload", path.display()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(PARQUET_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .with_context(|| format!("uploading {} to {}/{}", path.display(), bucket, key))?;

        debug!(bucket, key, bytes = len, "put_object complete");
        Ok(len)
    }
}
