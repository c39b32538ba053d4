//! HTTP transport for scrapes and pushes.
//!
//! All requests share one `reqwest` client with a fixed timeout that covers the entire request,
//! including reading the response body.

use std::io;
use std::path::{Path, PathBuf};

use pusher_config::{BasicAuth, Config, Password};
#[doc(inline)]
pub use reqwest::StatusCode;
use url::Url;

/// Maximum number of response body bytes kept for error reporting.
const ERROR_BODY_LIMIT: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("could not send request")]
    Reqwest(#[from] reqwest::Error),
    #[error("could not read certificate file {}", path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read password file {}", path.display())]
    PasswordFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("request failed with status {status}")]
    Status { status: StatusCode, body: String },
}

impl HttpError {
    /// Returns the response body of a failed request, if the server sent one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

/// Builds the shared client, reading additional trust roots from disk.
fn build_client(config: &Config) -> Result<reqwest::Client, HttpError> {
    let mut builder = reqwest::ClientBuilder::new().timeout(config.http_timeout());

    if let Some(path) = config.http_ca_cert() {
        let pem = std::fs::read(path).map_err(|source| HttpError::Certificate {
            path: path.to_owned(),
            source,
        })?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        pusher_log::debug!(path = %path.display(), "added trusted certificate");
    }

    Ok(builder.build()?)
}

/// Reads a password file, removing the trailing line break.
async fn read_password(path: &Path) -> Result<String, HttpError> {
    let password =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| HttpError::PasswordFile {
                path: path.to_owned(),
                source,
            })?;

    Ok(password.trim_end_matches(['\r', '\n']).to_owned())
}

/// Turns a non-success response into an error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }

    Err(HttpError::Status { status, body })
}

/// Client for scraping exporters and pushing batches.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    auth: Option<BasicAuth>,
}

impl HttpClient {
    /// Creates a client from the HTTP section of the configuration.
    pub fn new(config: &Config) -> Result<Self, HttpError> {
        Ok(Self {
            client: build_client(config)?,
            auth: config.http_auth(),
        })
    }

    /// Fetches the payload of an exporter.
    pub async fn scrape(&self, url: &Url) -> Result<Vec<u8>, HttpError> {
        let response = self.client.get(url.clone()).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Posts one batch to a Pushgateway.
    ///
    /// Password files are read on every push so that rotated credentials are picked up.
    pub async fn push(&self, url: &Url, body: Vec<u8>) -> Result<(), HttpError> {
        let mut request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);

        if let Some(auth) = &self.auth {
            let password = match &auth.password {
                Password::None => None,
                Password::Plain(password) => Some(password.clone()),
                Password::File(path) => Some(read_password(path).await?),
            };
            request = request.basic_auth(&auth.username, password);
        }

        let response = request.send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[tokio::test]
    async fn test_read_password_trims_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("password");
        std::fs::write(&path, "hunter2\n").unwrap();

        assert_eq!(read_password(&path).await.unwrap(), "hunter2");
    }

    #[tokio::test]
    async fn test_read_missing_password() {
        let error = read_password(Path::new("/nonexistent/password"))
            .await
            .unwrap_err();
        assert!(matches!(error, HttpError::PasswordFile { .. }));
    }

    #[test]
    fn test_missing_certificate() {
        let config =
            Config::from_yaml_str("http:\n  ca_cert: /nonexistent/ca.pem\n").unwrap();
        let error = HttpClient::new(&config).unwrap_err();
        assert_eq!(
            error.to_string(),
            "could not read certificate file /nonexistent/ca.pem"
        );
    }

    #[test]
    fn test_status_body() {
        let error = HttpError::Status {
            status: StatusCode::BAD_REQUEST,
            body: "text format parsing error".to_owned(),
        };
        assert_eq!(error.to_string(), "request failed with status 400 Bad Request");
        assert_eq!(error.body(), Some("text format parsing error"));
    }
}
