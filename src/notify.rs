use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, Jitter, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};

use crate::config::MailConfig;
use crate::error::DeliveryError;

#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Delivers one message to every recipient, returning the provider's id.
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<String, DeliveryError>;
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct DeliveryReceipt {
    id: Option<String>,
}

/// JSON email API client (`POST` with a bearer key, `{"id": ...}` back).
/// 429s, 5xx and connection failures are retried with exponential backoff,
/// up to `mail.max_attempts` sends in total.
#[derive(Clone)]
pub struct HttpMailer {
    http: ClientWithMiddleware,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(cfg: &MailConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("failed to construct reqwest client")?;

        Ok(Self {
            http: build_retry_client(client, cfg),
            api_url: cfg.api_url.clone(),
            api_key,
            from: cfg.from.clone(),
        })
    }
}

fn build_retry_client(client: Client, cfg: &MailConfig) -> ClientWithMiddleware {
    let (min, max) = cfg.retry_bounds();
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(min, max)
        .jitter(Jitter::Bounded)
        .build_with_max_retries(cfg.max_retries());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

#[async_trait]
impl NotificationSender for HttpMailer {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<String, DeliveryError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&OutgoingEmail {
                from: &self.from,
                to: recipients,
                subject,
                html: html_body,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(reqwest_middleware::Error::from)?;
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<DeliveryReceipt>(&body)
            .ok()
            .and_then(|receipt| receipt.id)
            .ok_or(DeliveryError::MalformedResponse(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mail_config(server: &MockServer) -> MailConfig {
        MailConfig {
            api_url: format!("{}/emails", server.uri()),
            from: "Safety Reports <reports@example.com>".to_string(),
            ..MailConfig::default()
        }
    }

    fn mailer(server: &MockServer) -> HttpMailer {
        HttpMailer::new(&mail_config(server), "test-key".to_string()).expect("client builds")
    }

    /// Responds 429 for the first `failures` requests, then accepts.
    async fn mount_rate_limited(server: &MockServer, failures: usize, expected: u64) -> Arc<AtomicUsize> {
        let request_count = Arc::new(AtomicUsize::new(0));
        let counter = request_count.clone();
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(move |_req: &wiremock::Request| {
                if counter.fetch_add(1, Ordering::SeqCst) < failures {
                    ResponseTemplate::new(429).set_body_string("rate limited")
                } else {
                    ResponseTemplate::new(200).set_body_string(r#"{"id": "msg_retry"}"#)
                }
            })
            .expect(expected)
            .mount(server)
            .await;
        request_count
    }

    #[tokio::test]
    async fn sends_message_and_returns_delivery_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "to": ["ops@acme.example"],
                "subject": "Weekly",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id": "msg_123"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let id = mailer(&server)
            .send(&["ops@acme.example".to_string()], "Weekly", "<p>hi</p>")
            .await
            .expect("delivery succeeds");
        assert_eq!(id, "msg_123");
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = mailer(&server)
            .send(&["ops@acme.example".to_string()], "Weekly", "<p>hi</p>")
            .await
            .expect_err("429 must fail");
        match err {
            DeliveryError::Rejected { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn success_without_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let err = mailer(&server)
            .send(&["ops@acme.example".to_string()], "Weekly", "<p>hi</p>")
            .await
            .expect_err("missing id must fail");
        assert!(matches!(err, DeliveryError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn rate_limited_sends_are_retried_with_backoff() {
        let server = MockServer::start().await;
        let request_count = mount_rate_limited(&server, 2, 3).await;
        let cfg = MailConfig {
            max_attempts: 3,
            retry_min_ms: 100,
            retry_max_ms: 400,
            ..mail_config(&server)
        };
        let mailer = HttpMailer::new(&cfg, "test-key".to_string()).expect("client builds");

        let started = Instant::now();
        let id = mailer
            .send(&["ops@acme.example".to_string()], "Weekly", "<p>hi</p>")
            .await
            .expect("delivery succeeds after retries");

        assert_eq!(id, "msg_retry");
        assert_eq!(request_count.load(Ordering::SeqCst), 3);
        assert!(
            started.elapsed() >= Duration::from_millis(200),
            "retries were not spaced out: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn single_attempt_does_not_retry() {
        let server = MockServer::start().await;
        let request_count = mount_rate_limited(&server, 1, 1).await;

        let err = mailer(&server)
            .send(&["ops@acme.example".to_string()], "Weekly", "<p>hi</p>")
            .await
            .expect_err("one attempt only");
        assert!(matches!(err, DeliveryError::Rejected { status: 429, .. }));
        assert_eq!(request_count.load(Ordering::SeqCst), 1);
    }
}
