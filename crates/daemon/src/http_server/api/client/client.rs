use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use url::Url;

use super::error::ApiError;
use super::ApiRequest;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    download_prefix: String,
    client: Client,
}

impl ApiClient {
    /// Build a client for `remote`, sending `token` as the `Authorization`
    /// header on every request when given.
    pub fn new(remote: &Url, token: Option<&str>) -> Result<Self, ApiError> {
        let mut default_headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token).map_err(|_| ApiError::InvalidToken)?;
            value.set_sensitive(true);
            default_headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            download_prefix: crate::state::DEFAULT_DOWNLOAD_PREFIX.to_string(),
            client,
        })
    }

    pub fn with_download_prefix(mut self, prefix: &str) -> Self {
        self.download_prefix = prefix.to_string();
        self
    }

    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client);
        let response = request_builder.send().await?;

        if response.status().is_success() {
            Ok(response.json::<T::Response>().await?)
        } else {
            Err(ApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    /// Start a download of `path` (relative to the served root). The body is
    /// left unread for the caller to stream.
    pub async fn download(&self, path: &str) -> Result<Response, ApiError> {
        let url = self.download_url(path)?;
        let response = self.client.get(url).send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ApiError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    /// Each segment of `path` is percent-encoded on its own, so names with
    /// spaces, `%` or `#` survive the trip.
    pub fn download_url(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = self.remote.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::CannotBeABase(self.remote.to_string()))?;
            segments.clear();
            segments.extend(self.download_prefix.split('/').filter(|s| !s.is_empty()));
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    /// Get the underlying HTTP client for custom requests
    pub fn http_client(&self) -> &Client {
        &self.client
    }
}
