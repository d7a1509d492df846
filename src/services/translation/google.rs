// Google Cloud Translation (v2 REST) client
//
// Blocking: the pipeline runs on its own worker thread. Transport errors,
// 429 and 5xx responses are retried with exponential backoff plus jitter.

use super::translator::RemoteTranslator;
use crate::core::config::TranslationConfig;
use crate::core::errors::{TranslationError, TranslationResult};
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_ENDPOINT: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(alias = "key")]
    api_key: String,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base * 2^retry plus up to
    /// half a base of jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_ms = self.base_backoff.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64 << retry.min(16));
        let jitter_ms = if base_ms > 1 {
            rand::thread_rng().gen_range(0..base_ms / 2)
        } else {
            0
        };
        Duration::from_millis(exp_ms + jitter_ms)
    }
}

pub struct GoogleTranslateClient {
    client: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl GoogleTranslateClient {
    /// Build a client authenticated with the key in `credentials_path`.
    ///
    /// Fails when the file is missing, unreadable or holds no key.
    pub fn new(credentials_path: &Path, config: &TranslationConfig) -> TranslationResult<Self> {
        let api_key = load_api_key(credentials_path)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        info!(
            "✓ Google Translate client ready (timeout {}s, {} retries)",
            config.timeout_seconds, config.max_retries
        );

        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        })
    }

    /// Point the client at a different base URL
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn send_once(&self, text: &str, source: &str, target: &str) -> Attempt {
        let request = TranslateRequest {
            q: text,
            source,
            target,
            format: "text",
        };

        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                return Attempt::Failed {
                    error: TranslationError::Http(e),
                    retryable,
                };
            }
        };

        let status = response.status();
        let body = match response.text() {
            Ok(body) => body,
            Err(e) => {
                return Attempt::Failed {
                    error: TranslationError::Http(e),
                    retryable: true,
                }
            }
        };

        if !status.is_success() {
            return Attempt::Failed {
                retryable: is_retryable_status(status),
                error: TranslationError::Status {
                    status: status.as_u16(),
                    body: truncate(&body, 200),
                },
            };
        }

        match parse_response(&body) {
            Ok(text) => Attempt::Done(text),
            Err(error) => Attempt::Failed {
                error,
                retryable: false,
            },
        }
    }
}

enum Attempt {
    Done(String),
    Failed {
        error: TranslationError,
        retryable: bool,
    },
}

impl RemoteTranslator for GoogleTranslateClient {
    fn translate(&self, text: &str, source: &str, target: &str) -> TranslationResult<String> {
        let mut retry = 0;
        loop {
            match self.send_once(text, source, target) {
                Attempt::Done(translated) => return Ok(translated),
                Attempt::Failed { error, retryable: false } => return Err(error),
                Attempt::Failed { error, .. } if retry >= self.retry.max_retries => {
                    if retry == 0 {
                        return Err(error);
                    }
                    return Err(TranslationError::RetriesExhausted {
                        attempts: retry + 1,
                        last_error: error.to_string(),
                    });
                }
                Attempt::Failed { error, .. } => {
                    let delay = self.retry.backoff(retry);
                    warn!(
                        "Translate request failed (attempt {}/{}): {}. Retrying in {:?}",
                        retry + 1,
                        self.retry.max_retries + 1,
                        error,
                        delay
                    );
                    std::thread::sleep(delay);
                    retry += 1;
                }
            }
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Read the API key from a JSON file (`api_key` or `key`) or a bare key file
pub fn load_api_key(path: &Path) -> TranslationResult<String> {
    if !path.exists() {
        return Err(TranslationError::CredentialsNotFound(path.to_path_buf()));
    }

    let invalid = |reason: String| TranslationError::InvalidCredentials {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let content = content.trim();

    let key = if content.starts_with('{') {
        serde_json::from_str::<CredentialsFile>(content)
            .map_err(|e| invalid(format!("expected an \"api_key\" field: {}", e)))?
            .api_key
    } else {
        content.to_string()
    };

    let key = key.trim().to_string();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(invalid("no usable API key".to_string()));
    }

    debug!("Loaded API key from {}", path.display());
    Ok(key)
}

/// Pull `data.translations[0].translatedText` out of a response body
pub fn parse_response(body: &str) -> TranslationResult<String> {
    let response: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;

    response
        .data
        .translations
        .into_iter()
        .next()
        .map(|t| t.translated_text)
        .ok_or_else(|| TranslationError::InvalidResponse("empty translations list".to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn config(max_retries: u32) -> TranslationConfig {
        TranslationConfig {
            credentials_path: None,
            source_language: "ja".to_string(),
            target_language: "en".to_string(),
            timeout_seconds: 5,
            max_retries,
            retry_backoff_ms: 1,
        }
    }

    fn write_credentials(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Serve the given (status, body) pairs, one per connection
    fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);

                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                }
                let mut request_body = vec![0u8; content_length];
                reader.read_exact(&mut request_body).unwrap();

                let response = format!(
                    "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                reader.get_mut().write_all(response.as_bytes()).unwrap();
            }
        });

        format!("http://{}/translate", addr)
    }

    #[test]
    fn test_load_api_key_formats() {
        let dir = TempDir::new().unwrap();

        let json = write_credentials(&dir, r#"{"api_key": "abc123"}"#);
        assert_eq!(load_api_key(&json).unwrap(), "abc123");

        let alias = write_credentials(&dir, r#"{"key": "def456"}"#);
        assert_eq!(load_api_key(&alias).unwrap(), "def456");

        let bare = write_credentials(&dir, "ghi789\n");
        assert_eq!(load_api_key(&bare).unwrap(), "ghi789");
    }

    #[test]
    fn test_load_api_key_errors() {
        let dir = TempDir::new().unwrap();

        assert!(matches!(
            load_api_key(&dir.path().join("nope.json")),
            Err(TranslationError::CredentialsNotFound(_))
        ));

        let empty = write_credentials(&dir, "  \n");
        assert!(matches!(
            load_api_key(&empty),
            Err(TranslationError::InvalidCredentials { .. })
        ));

        let wrong_field = write_credentials(&dir, r#"{"token": "x"}"#);
        assert!(matches!(
            load_api_key(&wrong_field),
            Err(TranslationError::InvalidCredentials { .. })
        ));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"data":{"translations":[{"translatedText":"Hello &amp; welcome","detectedSourceLanguage":"ja"}]}}"#;
        assert_eq!(parse_response(body).unwrap(), "Hello &amp; welcome");

        assert!(matches!(
            parse_response(r#"{"data":{"translations":[]}}"#),
            Err(TranslationError::InvalidResponse(_))
        ));
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
        };
        let first = policy.backoff(0);
        let third = policy.backoff(2);

        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third < Duration::from_millis(450));
    }

    #[test]
    fn test_retries_server_errors_then_succeeds() {
        let endpoint = serve(vec![
            (503, r#"{"error":"busy"}"#),
            (200, r#"{"data":{"translations":[{"translatedText":"Hello"}]}}"#),
        ]);
        let dir = TempDir::new().unwrap();
        let credentials = write_credentials(&dir, "key");

        let client = GoogleTranslateClient::new(&credentials, &config(2))
            .unwrap()
            .with_endpoint(endpoint);

        assert_eq!(client.translate("こんにちは", "ja", "en").unwrap(), "Hello");
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let endpoint = serve(vec![(403, r#"{"error":"forbidden"}"#)]);
        let dir = TempDir::new().unwrap();
        let credentials = write_credentials(&dir, "key");

        let client = GoogleTranslateClient::new(&credentials, &config(3))
            .unwrap()
            .with_endpoint(endpoint);

        assert!(matches!(
            client.translate("猫", "ja", "en"),
            Err(TranslationError::Status { status: 403, .. })
        ));
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let endpoint = serve(vec![
            (500, "{}"),
            (500, "{}"),
        ]);
        let dir = TempDir::new().unwrap();
        let credentials = write_credentials(&dir, "key");

        let client = GoogleTranslateClient::new(&credentials, &config(1))
            .unwrap()
            .with_endpoint(endpoint);

        assert!(matches!(
            client.translate("猫", "ja", "en"),
            Err(TranslationError::RetriesExhausted { attempts: 2, .. })
        ));
    }
}
