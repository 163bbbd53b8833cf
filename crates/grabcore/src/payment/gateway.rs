//! NOWPayments REST client

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::core::config;
use crate::core::{AppError, AppResult};

/// Payload for `POST /v1/invoice`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRequest {
    pub price_amount: f64,
    pub price_currency: String,
    pub order_id: String,
    pub order_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipn_callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedInvoice {
    pub id: String,
    pub invoice_url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> AppResult<CreatedInvoice>;

    /// Best effort; an invoice that is already gone upstream is not an error
    async fn cancel_invoice(&self, invoice_id: &str) -> AppResult<()>;
}

pub struct NowPaymentsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl NowPaymentsClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config::network::timeout())
            .build()?;
        let mut base_url = Url::parse(base_url)
            .map_err(|e| AppError::Validation(format!("bad NOWPayments URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url,
        })
    }

    /// Client for the configured API key, `None` when no key is set
    pub fn from_config() -> AppResult<Option<Self>> {
        if config::payment::NOWPAYMENTS_API_KEY.is_empty() {
            return Ok(None);
        }
        Self::new(
            config::payment::NOWPAYMENTS_API_KEY.as_str(),
            &config::payment::NOWPAYMENTS_API_URL,
        )
        .map(Some)
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Validation(format!("bad NOWPayments path '{}': {}", path, e)))
    }
}

/// Ids come back as numbers or strings depending on the endpoint
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_created(body: &Value) -> AppResult<CreatedInvoice> {
    let id = body
        .get("id")
        .and_then(value_to_string)
        .ok_or_else(|| AppError::Payment(format!("invoice response without id: {}", body)))?;
    Ok(CreatedInvoice {
        id,
        invoice_url: body.get("invoice_url").and_then(Value::as_str).map(str::to_string),
    })
}

#[async_trait]
impl PaymentGateway for NowPaymentsClient {
    async fn create_invoice(&self, request: &InvoiceRequest) -> AppResult<CreatedInvoice> {
        let response = self
            .http
            .post(self.endpoint("invoice")?)
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            return Err(AppError::Payment(format!("invoice creation failed ({}): {}", status, body)));
        }
        let created = parse_created(&body)?;
        log::info!("Created NOWPayments invoice {} for order {}", created.id, request.order_id);
        Ok(created)
    }

    async fn cancel_invoice(&self, invoice_id: &str) -> AppResult<()> {
        let response = self
            .http
            .delete(self.endpoint(&format!("invoice/{}", invoice_id))?)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            log::info!("Cancelled NOWPayments invoice {}", invoice_id);
            Ok(())
        } else {
            Err(AppError::Payment(format!("cancel of invoice {} failed: {}", invoice_id, status)))
        }
    }
}
