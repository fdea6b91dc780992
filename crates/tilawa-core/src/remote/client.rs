//! HTTP client for the content service
//!
//! Every exchange is bounded by a single deadline covering connect, headers
//! and body, so a stalled server can never hold a caller past the timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url};
use serde_json::{json, Value};
use tracing::debug;

use super::{ContentSource, NetworkError, UserStateSink};
use crate::config::Config;
use crate::models::{Bookmark, LastReadPosition};

/// Default request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Content service client over HTTP + JSON
#[derive(Debug, Clone)]
pub struct HttpContentClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpContentClient {
    /// Create a client for the given base URL with the default timeout
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a client from configuration, if a server is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        config
            .api_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| Self::new(url).with_timeout(config.request_timeout()))
    }

    /// Set the request deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Run an exchange under the client deadline
    async fn bounded<T>(
        &self,
        exchange: impl Future<Output = Result<T, NetworkError>>,
    ) -> Result<T, NetworkError> {
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| NetworkError::Timeout(self.timeout))?
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, NetworkError> {
        let response = request
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::HttpStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json(&self, request: RequestBuilder) -> Result<Value, NetworkError> {
        self.bounded(async {
            let response = self.send(request).await?;
            response
                .json::<Value>()
                .await
                .map_err(|e| NetworkError::from_reqwest(e, self.timeout))
        })
        .await
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), NetworkError> {
        self.bounded(async { self.send(request).await.map(|_| ()) })
            .await
    }

    /// URL of a per-user resource, each segment percent-encoded
    fn user_url(&self, user_id: &str, tail: &[&str]) -> Result<Url, NetworkError> {
        let invalid = || NetworkError::Unreachable(format!("invalid base URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("users")
            .push(user_id)
            .extend(tail);
        Ok(url)
    }

    fn bookmark_url(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> Result<Url, NetworkError> {
        let key = format!("{}:{}", chapter_id, verse_number);
        self.user_url(user_id, &["bookmarks", &key])
    }
}

#[async_trait]
impl ContentSource for HttpContentClient {
    async fn fetch_chapters(&self) -> Result<Value, NetworkError> {
        debug!("GET chapters");
        self.get_json(self.http.get(self.url("chapters"))).await
    }

    async fn fetch_verses_page(
        &self,
        chapter_id: u16,
        translation_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Value, NetworkError> {
        debug!(chapter_id, translation_id, ?cursor, "GET verses page");

        let mut request = self
            .http
            .get(self.url(&format!("chapters/{}/verses", chapter_id)))
            .query(&[
                ("translation", translation_id.to_string()),
                ("pageSize", page_size.to_string()),
            ]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        self.get_json(request).await
    }

    async fn fetch_translations(&self) -> Result<Value, NetworkError> {
        debug!("GET translations");
        self.get_json(self.http.get(self.url("translations"))).await
    }
}

#[async_trait]
impl UserStateSink for HttpContentClient {
    async fn push_bookmark(&self, bookmark: &Bookmark) -> Result<(), NetworkError> {
        let url =
            self.bookmark_url(&bookmark.user_id, bookmark.chapter_id, bookmark.verse_number)?;
        let request = self
            .http
            .put(url)
            .json(&json!({ "created_at": bookmark.created_at }));
        self.execute(request).await
    }

    async fn delete_bookmark(
        &self,
        user_id: &str,
        chapter_id: u16,
        verse_number: u16,
    ) -> Result<(), NetworkError> {
        let url = self.bookmark_url(user_id, chapter_id, verse_number)?;
        self.execute(self.http.delete(url)).await
    }

    async fn push_last_read(&self, position: &LastReadPosition) -> Result<(), NetworkError> {
        let url = self.user_url(&position.user_id, &["last-read"])?;
        let request = self
            .http
            .put(url)
            .json(&json!({
                "chapter_id": position.chapter_id,
                "verse_number": position.verse_number,
                "updated_at": position.updated_at,
            }));
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Read one HTTP request (headers plus any Content-Length body)
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break buf.len();
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let body_len = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);

        while buf.len() < header_end + body_len {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serve a single canned response; the handle yields the raw request
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });

        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn test_fetch_chapters_ok() {
        let (url, server) = serve_once("200 OK", r#"{"chapters":[]}"#).await;
        let client = HttpContentClient::new(url);

        let body = client.fetch_chapters().await.unwrap();
        assert_eq!(body, json!({"chapters": []}));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /chapters "));
    }

    #[tokio::test]
    async fn test_verses_query_parameters() {
        let (url, server) = serve_once("200 OK", r#"{"verses":[]}"#).await;
        let client = HttpContentClient::new(format!("{}/", url));

        client.fetch_verses_page(2, "en", Some("abc"), 10).await.unwrap();

        let request = server.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert!(request_line.starts_with("GET /chapters/2/verses?"));
        assert!(request_line.contains("translation=en"));
        assert!(request_line.contains("pageSize=10"));
        assert!(request_line.contains("cursor=abc"));
    }

    #[tokio::test]
    async fn test_http_status_classified() {
        let (url, _server) = serve_once("404 Not Found", "{}").await;
        let client = HttpContentClient::new(url);

        let err = client.fetch_translations().await.unwrap_err();
        assert_eq!(err, NetworkError::HttpStatus(404));
    }

    #[tokio::test]
    async fn test_malformed_body_classified() {
        let (url, _server) = serve_once("200 OK", "this is not json").await;
        let client = HttpContentClient::new(url);

        let err = client.fetch_chapters().await.unwrap_err();
        assert!(matches!(err, NetworkError::MalformedBody(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_timeout_bounds_the_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let timeout = Duration::from_millis(200);
        let client = HttpContentClient::new(format!("http://{}", addr)).with_timeout(timeout);

        let started = std::time::Instant::now();
        let err = client.fetch_chapters().await.unwrap_err();
        assert_eq!(err, NetworkError::Timeout(timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unreachable_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpContentClient::new(format!("http://{}", addr));
        let err = client.fetch_chapters().await.unwrap_err();
        assert!(matches!(err, NetworkError::Unreachable(_)), "got {:?}", err);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_push_bookmark_request() {
        let (url, server) = serve_once("204 No Content", "").await;
        let client = HttpContentClient::new(url);

        client
            .push_bookmark(&Bookmark::new("u1", 2, 255))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /users/u1/bookmarks/2:255 "));
        assert!(request.contains("created_at"));
    }

    #[tokio::test]
    async fn test_delete_bookmark_request() {
        let (url, server) = serve_once("200 OK", "{}").await;
        let client = HttpContentClient::new(url);

        client.delete_bookmark("u1", 1, 1).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /users/u1/bookmarks/1:1 "));
    }

    #[tokio::test]
    async fn test_user_id_is_one_path_segment() {
        let (url, server) = serve_once("204 No Content", "").await;
        let client = HttpContentClient::new(format!("{}/v4", url));

        client.delete_bookmark("a/b?c#d", 1, 1).await.unwrap();

        let request = server.await.unwrap();
        assert!(
            request.starts_with("DELETE /v4/users/a%2Fb%3Fc%23d/bookmarks/1:1 "),
            "{}",
            request.lines().next().unwrap_or_default()
        );
    }

    #[tokio::test]
    async fn test_push_last_read_request() {
        let (url, server) = serve_once("204 No Content", "").await;
        let client = HttpContentClient::new(url);

        client
            .push_last_read(&LastReadPosition::new("u1", 18, 10))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /users/u1/last-read "));
        assert!(request.contains("\"verse_number\":10"));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        assert!(HttpContentClient::from_config(&config).is_none());

        config.api_url = Some("https://api.example.com/v4/".to_string());
        config.request_timeout_secs = 3;
        let client = HttpContentClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com/v4");
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }
}
