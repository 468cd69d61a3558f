// SPDX-License-Identifier: BUSL-1.1
//! # HTTP Payment Processor
//!
//! Speaks the Stripe-style form API:
//!
//! - `POST {base}/v1/transfers`: `amount`, `currency`, `destination`,
//!   `metadata[...]`
//! - `POST {base}/v1/refunds`: `payment_intent`, optional `amount`,
//!   `metadata[...]`
//!
//! Every request carries an `Idempotency-Key` header. Transport failures are
//! retried with backoff; 5xx maps to `ServiceUnavailable`, 4xx to `Rejected`
//! with the processor's error message.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::processor::{
    PaymentProcessor, ProcessorReceipt, RefundRequest, SettlementMetadata, TransferRequest,
};
use crate::retry::Backoff;

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorObject,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    message: Option<String>,
    code: Option<String>,
}

/// Real HTTP client for the payment processor.
#[derive(Debug)]
pub struct HttpPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpPaymentProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self, ProcessorError> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.as_str()))
            .map_err(|_| ProcessorError::NotConfigured {
                reason: "invalid API key characters".into(),
            })?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ProcessorError::NotConfigured {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.timeout_secs.saturating_mul(1000),
        })
    }

    async fn post_form(
        &self,
        path: &str,
        operation: &str,
        idempotency_key: &str,
        form: &[(String, String)],
    ) -> Result<ProcessorReceipt, ProcessorError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = Backoff::default().send(operation, || {
            self.client
                .post(&url)
                .header("Idempotency-Key", idempotency_key)
                .form(form)
                .send()
        })
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProcessorError::Timeout {
                    elapsed_ms: self.timeout_ms,
                }
            } else {
                ProcessorError::ServiceUnavailable {
                    reason: format!("{operation}: {e}"),
                }
            }
        })?;

        let status = resp.status();
        // Throttling that outlasted the retries is transient, not a refusal.
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProcessorError::ServiceUnavailable {
                reason: format!("{operation}: HTTP {status}: {body}"),
            });
        }
        if status.is_client_error() {
            let reason = match resp.json::<ErrorEnvelope>().await {
                Ok(envelope) => match (envelope.error.code, envelope.error.message) {
                    (Some(code), Some(message)) => format!("{code}: {message}"),
                    (None, Some(message)) => message,
                    (Some(code), None) => code,
                    (None, None) => format!("HTTP {status}"),
                },
                Err(_) => format!("HTTP {status}"),
            };
            return Err(ProcessorError::Rejected {
                operation: operation.to_string(),
                reason,
            });
        }

        let object: ObjectResponse = resp.json().await.map_err(|e| ProcessorError::InvalidResponse {
            reason: format!("{operation}: {e}"),
        })?;
        Ok(ProcessorReceipt {
            receipt_id: object.id,
        })
    }
}

fn metadata_fields(metadata: &SettlementMetadata, form: &mut Vec<(String, String)>) {
    form.push(("metadata[job_id]".into(), metadata.job_id.to_string()));
    form.push(("metadata[dispute_id]".into(), metadata.dispute_id.to_string()));
    form.push(("metadata[resolution]".into(), metadata.resolution.clone()));
}

#[async_trait]
impl PaymentProcessor for HttpPaymentProcessor {
    async fn transfer(&self, request: &TransferRequest) -> Result<ProcessorReceipt, ProcessorError> {
        let mut form = vec![
            ("amount".to_string(), request.amount.minor_units().to_string()),
            ("currency".to_string(), request.currency.clone()),
            ("destination".to_string(), request.destination.clone()),
        ];
        metadata_fields(&request.metadata, &mut form);
        self.post_form("/v1/transfers", "transfer", &request.idempotency_key, &form)
            .await
    }

    async fn refund(&self, request: &RefundRequest) -> Result<ProcessorReceipt, ProcessorError> {
        let mut form = vec![("payment_intent".to_string(), request.processor_ref.clone())];
        if let Some(amount) = request.amount {
            form.push(("amount".to_string(), amount.minor_units().to_string()));
        }
        metadata_fields(&request.metadata, &mut form);
        self.post_form("/v1/refunds", "refund", &request.idempotency_key, &form)
            .await
    }

    fn adapter_name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{Amount, DisputeId, JobId};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn processor(server: &MockServer) -> HttpPaymentProcessor {
        HttpPaymentProcessor::new(ProcessorConfig::new(server.uri(), "sk_test_123")).unwrap()
    }

    fn metadata() -> SettlementMetadata {
        SettlementMetadata {
            job_id: JobId::new(),
            dispute_id: DisputeId::new(),
            resolution: "partial_release".into(),
        }
    }

    #[tokio::test]
    async fn transfer_posts_form_with_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/transfers"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(header("idempotency-key", "abc123"))
            .and(body_string_contains("amount=20000"))
            .and(body_string_contains("destination=acct_42"))
            .and(body_string_contains("metadata%5Bresolution%5D=partial_release"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "tr_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = processor(&server)
            .transfer(&TransferRequest {
                amount: Amount::from_minor_units(20_000).unwrap(),
                currency: "usd".into(),
                destination: "acct_42".into(),
                idempotency_key: "abc123".into(),
                metadata: metadata(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.receipt_id, "tr_1");
    }

    #[tokio::test]
    async fn full_refund_omits_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/refunds"))
            .and(body_string_contains("payment_intent=pi_9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "re_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = processor(&server)
            .refund(&RefundRequest {
                processor_ref: "pi_9".into(),
                amount: None,
                idempotency_key: "k".into(),
                metadata: metadata(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.receipt_id, "re_1");

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body).to_string();
        assert!(!body.contains("amount="));
    }

    #[tokio::test]
    async fn client_error_maps_to_rejected_with_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/refunds"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"code": "charge_already_refunded", "message": "Charge has already been refunded."}
            })))
            .mount(&server)
            .await;

        let err = processor(&server)
            .refund(&RefundRequest {
                processor_ref: "pi_9".into(),
                amount: Some(Amount::from_minor_units(100).unwrap()),
                idempotency_key: "k".into(),
                metadata: metadata(),
            })
            .await
            .unwrap_err();
        match err {
            ProcessorError::Rejected { operation, reason } => {
                assert_eq!(operation, "refund");
                assert!(reason.starts_with("charge_already_refunded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_maps_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = processor(&server)
            .transfer(&TransferRequest {
                amount: Amount::from_minor_units(1).unwrap(),
                currency: "usd".into(),
                destination: "acct_1".into(),
                idempotency_key: "k".into(),
                metadata: metadata(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::ServiceUnavailable { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn persistent_throttling_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/refunds"))
            .and(header("Idempotency-Key", "refund-k"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(4)
            .mount(&server)
            .await;

        let err = processor(&server)
            .refund(&RefundRequest {
                processor_ref: "pi_1".into(),
                amount: None,
                idempotency_key: "refund-k".into(),
                metadata: metadata(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::ServiceUnavailable { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn unparseable_success_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let err = processor(&server)
            .transfer(&TransferRequest {
                amount: Amount::from_minor_units(1).unwrap(),
                currency: "usd".into(),
                destination: "acct_1".into(),
                idempotency_key: "k".into(),
                metadata: metadata(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidResponse { .. }));
    }
}
