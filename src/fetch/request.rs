//! The HTTP side of a texture download.

use futures::StreamExt;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::error_handling::FetchError;

/// Issues a cache-bypassing GET for `url` and reads the body, refusing bodies
/// larger than `max_bytes`.
///
/// The declared `Content-Length` is checked before reading, and the running
/// total is checked after every chunk, so an oversized body is abandoned
/// without being buffered in full.
pub(crate) async fn download_with_limit(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .header(CACHE_CONTROL, "no-cache")
        .header(PRAGMA, "no-cache")
        .send()
        .await
        .map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    if let Some(declared) = response.content_length() {
        if declared > max_bytes {
            return Err(FetchError::SizeExceeded {
                size: declared,
                limit: max_bytes,
            });
        }
    }

    let capacity = response.content_length().unwrap_or(64 * 1024).min(max_bytes);
    let mut body = Vec::with_capacity(usize::try_from(capacity).unwrap_or(0));
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::Network {
            url: url.to_string(),
            source,
        })?;

        let total = body.len() as u64 + chunk.len() as u64;
        if total > max_bytes {
            log::debug!("Aborting download of {url} at {total} bytes (max: {max_bytes})");
            return Err(FetchError::SizeExceeded {
                size: total,
                limit: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[tokio::test]
    async fn test_download_sends_cache_bypass_headers() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/goes.jpg"),
                request::headers(contains(("cache-control", "no-cache"))),
                request::headers(contains(("pragma", "no-cache"))),
            ])
            .respond_with(status_code(200).body(vec![0xFF, 0xD8, 0xFF, 0xE0])),
        );

        let body = download_with_limit(&client(), &server.url_str("/goes.jpg"), 1024)
            .await
            .expect("download should succeed");
        assert_eq!(body, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[tokio::test]
    async fn test_download_maps_non_success_status() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/missing.jpg"))
                .respond_with(status_code(404)),
        );

        match download_with_limit(&client(), &server.url_str("/missing.jpg"), 1024).await {
            Err(FetchError::HttpStatus { status, url }) => {
                assert_eq!(status, 404);
                assert!(url.ends_with("/missing.jpg"));
            }
            other => panic!("Expected HttpStatus, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_rejects_oversized_body() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/big.jpg"))
                .respond_with(status_code(200).body(vec![0u8; 4096])),
        );

        match download_with_limit(&client(), &server.url_str("/big.jpg"), 1000).await {
            Err(FetchError::SizeExceeded { size, limit }) => {
                assert!(size > 1000);
                assert_eq!(limit, 1000);
            }
            other => panic!("Expected SizeExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_accepts_body_at_limit() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/edge.jpg"))
                .respond_with(status_code(200).body(vec![7u8; 1000])),
        );

        let body = download_with_limit(&client(), &server.url_str("/edge.jpg"), 1000)
            .await
            .expect("body at the limit should pass");
        assert_eq!(body.len(), 1000);
    }

    #[tokio::test]
    async fn test_download_connection_failure_is_network_error() {
        // Nothing listens on the discard port.
        let result = download_with_limit(&client(), "http://127.0.0.1:9/goes.jpg", 1024).await;
        assert!(matches!(result, Err(FetchError::Network { .. })));
    }
}
