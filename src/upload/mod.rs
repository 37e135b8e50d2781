use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod s3;

pub use s3::S3Store;

/// Where converted files land: `<bucket>/<branch>/<prefix>/<file>`.
///
/// With the lakeFS S3 gateway the first path segment of the key is the branch,
/// so the same layout works against plain S3 as a simple key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LakeTarget {
    pub bucket: String,
    pub branch: String,
    pub prefix: String,
}

impl LakeTarget {
    pub fn object_key(&self, file_name: &str) -> String {
        [self.branch.as_str(), self.prefix.as_str(), file_name]
            .iter()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// `bucket/key`, as printed in logs.
    pub fn display(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, key)
    }
}

/// Minimal object-store surface the pipeline needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Upload the file at `path` to `bucket/key`, returning the bytes sent.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64>;
}
