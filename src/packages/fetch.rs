// src/packages/fetch.rs

//! Download package blobs over HTTP(S)
//!
//! A single GET per URL; any transport error or non-success status fails
//! the import.

use crate::error::Result;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::info;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether an import argument should be treated as a URL
pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Blocking HTTP client for package imports
pub struct PackageFetcher {
    client: Client,
}

impl PackageFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Fetch the whole body of `url`
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Downloading {}", url);
        let response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://downloads.example.org/foo_1.0_x.ipk"));
        assert!(is_url("http://host/foo.ipk"));
        assert!(!is_url("/tmp/foo.ipk"));
        assert!(!is_url("foo.ipk"));
    }
}
