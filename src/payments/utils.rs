use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::AggregatorName;
use base64::Engine;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw provider reply; callers decide which status codes count as success.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn decode<T: DeserializeOwned>(&self, provider: AggregatorName) -> PaymentResult<T> {
        serde_json::from_str::<T>(&self.body).map_err(|e| PaymentError::ProviderError {
            provider: provider.to_string(),
            message: format!("invalid provider JSON response: {}", e),
            provider_code: Some(self.status.as_u16().to_string()),
            retryable: false,
        })
    }

    pub fn into_error(self, provider: AggregatorName) -> PaymentError {
        PaymentError::ProviderError {
            provider: provider.to_string(),
            message: format!("HTTP {}: {}", self.status, self.body),
            provider_code: Some(self.status.as_u16().to_string()),
            retryable: self.status.is_server_error(),
        }
    }
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: AggregatorName,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: AggregatorName, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            PaymentError::configuration(format!("failed to initialize HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
        })
    }

    /// Sends one request. Only GETs are retried: a charge POST that timed out
    /// may already have been accepted, so it is never replayed.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<HttpReply> {
        let retries = if method == Method::GET {
            self.max_retries
        } else {
            0
        };

        let mut last_error = None;
        for attempt in 0..=retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(value) = authorization {
                request = request.header("Authorization", value);
            }
            for (k, v) in additional_headers {
                request = request.header(*k, *v);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = match resp.text().await {
                        Ok(text) => text,
                        Err(e) => {
                            // Headers arrived, so the provider saw the request.
                            last_error = Some(PaymentError::NetworkError {
                                message: format!(
                                    "{} reply body could not be read: {}",
                                    self.provider, e
                                ),
                                outcome_unknown: method != Method::GET,
                            });
                            if attempt < retries {
                                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                                continue;
                            }
                            break;
                        }
                    };
                    debug!(
                        provider = %self.provider,
                        status = %status,
                        url = %url,
                        "provider replied"
                    );

                    let transient =
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if transient && attempt < retries {
                        warn!(
                            provider = %self.provider,
                            status = %status,
                            attempt = attempt + 1,
                            "provider unavailable, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Ok(HttpReply { status, body: text });
                }
                Err(e) => {
                    let outcome_unknown = !(e.is_connect() || e.is_builder());
                    last_error = Some(PaymentError::NetworkError {
                        message: format!("{} request failed: {}", self.provider, e),
                        outcome_unknown,
                    });
                    if attempt < retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: format!("{} request failed", self.provider),
            outcome_unknown: false,
        }))
    }

    /// `send` plus the usual "2xx means decode it" rule.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let reply = self
            .send(method, url, authorization, body, additional_headers)
            .await?;
        if !reply.status.is_success() {
            return Err(reply.into_error(self.provider));
        }
        reply.decode(self.provider)
    }
}

/// `Basic base64(server_key + ":")`.
pub fn basic_auth_header(server_key: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{}:", server_key))
    )
}

pub fn sha512_hex(input: &str) -> String {
    use sha2::{Digest, Sha512};

    hex::encode(Sha512::digest(input.as_bytes()))
}

pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};

    hex::encode(Sha256::digest(input.as_bytes()))
}

pub fn hmac_sha256_hex(secret: &str, payload: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn basic_auth_appends_colon_before_encoding() {
        // base64("SB-Mid-server-abc:")
        assert_eq!(
            basic_auth_header("SB-Mid-server-abc"),
            "Basic U0ItTWlkLXNlcnZlci1hYmM6"
        );
    }

    #[test]
    fn digests_are_lowercase_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha512_hex("abc").len(), 128);
        let mac = hmac_sha256_hex("secret", "payload").expect("hmac accepts any key");
        assert_eq!(mac.len(), 64);
        assert_ne!(Some(mac), hmac_sha256_hex("other", "payload"));
    }

    #[test]
    fn failed_reply_becomes_provider_error() {
        let reply = HttpReply {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        };
        match reply.into_error(AggregatorName::Espay) {
            PaymentError::ProviderError {
                provider,
                retryable,
                provider_code,
                ..
            } => {
                assert_eq!(provider, "espay");
                assert!(retryable);
                assert_eq!(provider_code.as_deref(), Some("502"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn truncated_charge_reply_is_outcome_unknown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 200\r\n\r\n{\"status_code\":")
                .await
                .expect("write");
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = PaymentHttpClient::new(AggregatorName::Midtrans, Duration::from_secs(1), 0)
            .expect("client");
        let err = client
            .send(
                Method::POST,
                &format!("http://{}/v2/charge", addr),
                None,
                Some(&serde_json::json!({ "order_id": "ORD-1" })),
                &[],
            )
            .await
            .expect_err("body never completes");
        assert!(err.is_outcome_unknown());
    }
}
