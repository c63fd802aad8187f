//! Object-store access: the paged key listing loop and the S3 client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::contract::{KeyPage, ObjectStore};
use crate::error::StoreError;

/// Keys containing this marker are archived copies and never listed.
pub const EXCLUDED_KEY_MARKER: &str = "historical";

/// Join a key prefix and a name; an empty prefix yields the bare name.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// All keys under `prefix/` ending in `extension`, following continuation
/// tokens until the store stops returning one.
pub async fn list_keys(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    extension: &str,
) -> Result<Vec<String>, StoreError> {
    let listing_prefix = format!("{}/", prefix.trim_end_matches('/'));
    info!(bucket, prefix = %listing_prefix, extension, "[STORE] Listing keys");

    let mut keys = Vec::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;
    loop {
        let page = store.list_page(bucket, &listing_prefix, continuation.take()).await?;
        pages += 1;
        keys.extend(
            page.keys
                .into_iter()
                .filter(|k| k.ends_with(extension) && !k.contains(EXCLUDED_KEY_MARKER)),
        );
        match page.next_continuation {
            Some(token) if !token.is_empty() => continuation = Some(token),
            _ => break,
        }
    }

    info!(bucket, pages, found = keys.len(), "[STORE] Listing complete");
    Ok(keys)
}

/// [`ObjectStore`] backed by aws-sdk-s3.
///
/// Credentials come from the default AWS chain: environment variables,
/// `~/.aws/credentials`, or an instance role.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS configuration, optionally forcing a region.
    pub async fn from_env(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;
        info!(
            region = ?sdk_config.region().map(|r| r.as_ref().to_string()),
            "[STORE] Initialised S3 client"
        );
        Self::new(aws_sdk_s3::Client::new(&sdk_config))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<KeyPage, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| StoreError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source: Box::new(e),
            })?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect();
        Ok(KeyPage {
            keys,
            next_continuation: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn download_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StoreError> {
        let download_err = |source: Box<dyn std::error::Error + Send + Sync>| StoreError::Download {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let mut output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_err(Box::new(e)))?;

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut written = 0usize;
        while let Some(chunk) = output
            .body
            .try_next()
            .await
            .map_err(|e| download_err(Box::new(e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(bucket, key, bytes = written, path = %local_path.display(), "[STORE] Downloaded object");
        Ok(())
    }

    async fn upload_object(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let upload_err = |source: Box<dyn std::error::Error + Send + Sync>| StoreError::Upload {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        };

        let body = aws_sdk_s3::primitives::ByteStream::from_path(local_path)
            .await
            .map_err(|e| upload_err(Box::new(e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| upload_err(Box::new(e)))?;

        debug!(bucket, key, path = %local_path.display(), "[STORE] Uploaded object");
        Ok(())
    }
}
