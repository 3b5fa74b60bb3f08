//! Object store adapter: image upload, public url resolution and deletion.
//!
//! The backing service is an external asset host speaking a small JSON/multipart
//! HTTP protocol. Only the [`ObjectStore`] trait is visible to the domain code.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::multipart;
use serde::Deserialize;

pub type Storage = Arc<dyn ObjectStore + Send + Sync>;

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Clone)]
pub struct Config {
    url: String,
    delivery_url: String,
    api_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::from("http://127.0.0.1:9000/api"),
            delivery_url: String::from("http://127.0.0.1:9000/assets"),
            api_key: String::new(),
        }
    }
}

impl Config {
    pub fn env() -> Option<Self> {
        let url = env::var("OBJECT_STORE_URL").ok();
        let delivery_url = env::var("OBJECT_STORE_DELIVERY_URL").ok();

        if let (Some(url), Some(delivery_url)) = (url, delivery_url) {
            let api_key = env::var("OBJECT_STORE_API_KEY").unwrap_or_default();
            Some(Self {
                url,
                delivery_url,
                api_key,
            })
        } else {
            warn!("OBJECT_STORE env is not configured");
            None
        }
    }
}

/// Raw image as received from the client.
#[derive(Clone, Debug)]
pub struct Image {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct UploadedAsset {
    pub public_id: String,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait ObjectStore {
    async fn upload_image(&self, image: &Image, folder: &str) -> Result<UploadedAsset>;

    fn url(&self, public_id: &str) -> String;

    async fn delete_image(&self, public_id: &str) -> Result<bool>;
}

pub struct HttpObjectStore {
    cfg: Config,
    http: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(cfg: Config, http: reqwest::Client) -> Self {
        Self { cfg, http }
    }
}

#[derive(Deserialize)]
struct DeleteResponse {
    result: String,
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload_image(&self, image: &Image, folder: &str) -> Result<UploadedAsset> {
        let part = multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;

        let form = multipart::Form::new()
            .text("folder", folder.to_owned())
            .part("file", part);

        let asset = self
            .http
            .post(format!("{}/upload", self.cfg.url))
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<UploadedAsset>()
            .await?;

        debug!("uploaded {} as {}", image.file_name, asset.public_id);
        Ok(asset)
    }

    fn url(&self, public_id: &str) -> String {
        format!("{}/{public_id}", self.cfg.delivery_url)
    }

    async fn delete_image(&self, public_id: &str) -> Result<bool> {
        let res = self
            .http
            .delete(format!("{}/assets/{public_id}", self.cfg.url))
            .bearer_auth(&self.cfg.api_key)
            .send()
            .await?
            .error_for_status()?
            .json::<DeleteResponse>()
            .await?;

        Ok(res.result == "ok")
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    _Reqwest(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_delivery_url() {
        let store = HttpObjectStore::new(Config::default(), reqwest::Client::new());

        assert_eq!(
            store.url("conversations/c1/a.png"),
            "http://127.0.0.1:9000/assets/conversations/c1/a.png"
        );
    }
}
