use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha512;
use std::time::Duration;
use url::Url;

use super::models::{RefundCreate, RemoteRefund, RemoteTransaction, TransactionCreate};
use super::ProcessorError;
use crate::ports::PaymentProcessor;

type HmacSha512 = Hmac<Sha512>;

const MAC_VERSION: &str = "1";

/// API credentials for one PostFinance Checkout space.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub space_id: u64,
    pub user_id: u64,
    /// Base64 encoded authentication key as shown in the back office.
    pub secret_key: String,
}

/// HTTP client for the PostFinance Checkout REST API
#[derive(Clone)]
pub struct PostFinanceClient {
    client: Client,
    base_url: Url,
    space_id: u64,
    user_id: u64,
    mac_key: Vec<u8>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PostFinanceClient {
    /// Creates a client with the default circuit breaker (3 failures, 60-120s reset)
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, ProcessorError> {
        Self::with_circuit_breaker(base_url, credentials, 3, 60)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        base_url: &str,
        credentials: Credentials,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        // Url::join drops the last segment unless the base ends with a slash.
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| ProcessorError::Configuration(format!("invalid API url: {}", e)))?;
        let mac_key = STANDARD
            .decode(credentials.secret_key.trim())
            .map_err(|e| ProcessorError::Configuration(format!("secret key is not base64: {}", e)))?;

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(PostFinanceClient {
            client,
            base_url,
            space_id: credentials.space_id,
            user_id: credentials.user_id,
            mac_key,
            circuit_breaker,
        })
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ProcessorError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| ProcessorError::Configuration(format!("invalid endpoint {}: {}", path, e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("spaceId", &self.space_id.to_string());
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// MAC over `version|user|timestamp|METHOD|path?query`.
    fn sign(&self, method: &Method, url: &Url, timestamp: i64) -> Result<String, ProcessorError> {
        let mut resource = url.path().to_string();
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }
        let data = format!(
            "{}|{}|{}|{}|{}",
            MAC_VERSION,
            self.user_id,
            timestamp,
            method.as_str(),
            resource
        );

        let mut mac = HmacSha512::new_from_slice(&self.mac_key)
            .map_err(|e| ProcessorError::Configuration(e.to_string()))?;
        mac.update(data.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ProcessorError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.sign(&method, &url, timestamp)?;

        let mut request = self
            .client
            .request(method, url.clone())
            .header("Accept", "application/json")
            .header("x-mac-version", MAC_VERSION)
            .header("x-mac-userid", self.user_id.to_string())
            .header("x-mac-timestamp", timestamp.to_string())
            .header("x-mac-value", signature);
        if let Some(body) = body {
            request = request.json(body);
        }

        let target = url.path().to_string();
        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                decode(target, response).await
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(ProcessorError::CircuitBreakerOpen(
                "PostFinance API circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

async fn decode<T: DeserializeOwned>(target: String, response: Response) -> Result<T, ProcessorError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ProcessorError::NotFound(target));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProcessorError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ProcessorError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl PaymentProcessor for PostFinanceClient {
    async fn create_transaction(
        &self,
        request: &TransactionCreate,
    ) -> Result<RemoteTransaction, ProcessorError> {
        let url = self.endpoint("transaction/create", &[])?;
        self.send(Method::POST, url, Some(request)).await
    }

    async fn payment_page_url(&self, transaction_id: &str) -> Result<String, ProcessorError> {
        let url = self.endpoint("transaction-payment-page/payment-page-url", &[("id", transaction_id)])?;
        self.send::<(), String>(Method::GET, url, None).await
    }

    async fn read_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<RemoteTransaction, ProcessorError> {
        let url = self.endpoint("transaction/read", &[("id", transaction_id)])?;
        self.send::<(), _>(Method::GET, url, None).await
    }

    async fn create_refund(&self, request: &RefundCreate) -> Result<RemoteRefund, ProcessorError> {
        let url = self.endpoint("refund/refund", &[])?;
        self.send(Method::POST, url, Some(request)).await
    }

    async fn read_refund(&self, refund_id: &str) -> Result<RemoteRefund, ProcessorError> {
        let url = self.endpoint("refund/read", &[("id", refund_id)])?;
        self.send::<(), _>(Method::GET, url, None).await
    }
}
