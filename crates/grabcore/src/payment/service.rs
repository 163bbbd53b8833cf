//! Invoice bookkeeping and IPN handling
//!
//! An IPN only upgrades an account when it is authentic, refers to a pending
//! invoice still inside its payment window, reports a paid status and
//! carries the invoiced amount. The invoice is taken atomically before the
//! upgrade, so a provider retrying the same notification cannot extend the
//! plan twice.

use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::metrics::PAYMENT_EVENTS_TOTAL;
use crate::core::{AppError, AppResult, SharedClock};
use crate::payment::gateway::value_to_string;
use crate::payment::{signature, InvoiceRequest, PaymentGateway, PaymentSettings, PendingInvoice};
use crate::quota::{Account, AccountId};
use crate::storage::{InvoiceStore, UserStore};

/// Statuses that mean the money arrived
const PAID_STATUSES: &[&str] = &["finished", "confirmed"];

#[derive(Debug, Clone, PartialEq)]
pub enum IpnOutcome {
    /// Premium granted
    Applied {
        account: Account,
        invoice_id: String,
        days: i64,
    },
    /// Authentic but not (yet) paid; invoice kept
    Ignored { status: String },
}

pub struct PaymentService {
    store: Arc<dyn UserStore>,
    invoices: Arc<dyn InvoiceStore>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    clock: SharedClock,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn UserStore>,
        invoices: Arc<dyn InvoiceStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        clock: SharedClock,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            store,
            invoices,
            gateway,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &PaymentSettings {
        &self.settings
    }

    /// Create a hosted invoice for one of the price tiers and remember it
    pub async fn create_invoice(&self, account_id: AccountId, amount: f64) -> AppResult<PendingInvoice> {
        let tier = self
            .settings
            .tier_for(amount)
            .ok_or_else(|| AppError::Validation(format!("no plan costs ${}", amount)))?;
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| AppError::Payment("payments are not configured".to_string()))?;

        let order_id = format!("{}:{}:{}", account_id, tier.amount, uuid::Uuid::new_v4());
        let request = InvoiceRequest {
            price_amount: tier.amount,
            price_currency: "usd".to_string(),
            order_id: order_id.clone(),
            order_description: format!("Premium for {} days", tier.days),
            ipn_callback_url: self.settings.callback_base_url.as_ref().map(|base| format!("{}/ipn", base)),
            success_url: self.settings.success_url.clone(),
        };
        let created = gateway.create_invoice(&request).await?;

        let invoice = PendingInvoice {
            invoice_id: created.id,
            order_id,
            account_id,
            amount: tier.amount,
            invoice_url: created.invoice_url,
            created_at: self.clock.now(),
        };
        self.invoices.insert(invoice.clone()).await?;
        log::info!(
            "Pending invoice {} for account {}: ${} ({} days)",
            invoice.invoice_id,
            account_id,
            tier.amount,
            tier.days
        );
        Ok(invoice)
    }

    /// Process one IPN delivery
    pub async fn handle_ipn(&self, body: &[u8], signature_header: Option<&str>) -> AppResult<IpnOutcome> {
        let result = self.process_ipn(body, signature_header).await;
        let outcome = match &result {
            Ok(IpnOutcome::Applied { .. }) => "applied",
            Ok(IpnOutcome::Ignored { .. }) => "ignored",
            Err(AppError::InvalidSignature) => "invalid_signature",
            Err(AppError::InvoiceNotFound(_)) => "not_found",
            Err(AppError::InvoiceExpired(_)) => "expired",
            Err(AppError::AmountMismatch { .. }) => "amount_mismatch",
            Err(_) => "error",
        };
        PAYMENT_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn process_ipn(&self, body: &[u8], signature_header: Option<&str>) -> AppResult<IpnOutcome> {
        let payload: Value = serde_json::from_slice(body).map_err(|e| {
            log::warn!("IPN body is not JSON: {}", e);
            AppError::InvalidSignature
        })?;

        if !signature::verify(&self.settings.ipn_secret, &payload, signature_header) {
            log::warn!("IPN rejected: bad signature");
            return Err(AppError::InvalidSignature);
        }

        let invoice = self.locate(&payload).await?;

        let now = self.clock.now();
        if now - invoice.created_at > self.settings.invoice_window {
            self.invoices.take(&invoice.invoice_id).await?;
            log::warn!("IPN for expired invoice {} discarded", invoice.invoice_id);
            return Err(AppError::InvoiceExpired(invoice.invoice_id));
        }

        let status = payload
            .get("payment_status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !PAID_STATUSES.contains(&status.as_str()) {
            log::info!("IPN for invoice {} with status '{}' acknowledged", invoice.invoice_id, status);
            return Ok(IpnOutcome::Ignored { status });
        }

        let paid = payload
            .get("price_amount")
            .and_then(json_number)
            .ok_or_else(|| AppError::Validation("IPN without price_amount".to_string()))?;
        if (paid - invoice.amount).abs() > self.settings.amount_epsilon {
            log::warn!(
                "IPN amount mismatch for invoice {}: expected {}, got {}",
                invoice.invoice_id,
                invoice.amount,
                paid
            );
            return Err(AppError::AmountMismatch {
                expected: invoice.amount,
                paid,
            });
        }

        let days = self
            .settings
            .tier_for(invoice.amount)
            .map(|tier| tier.days)
            .ok_or_else(|| AppError::Validation(format!("no plan costs ${}", invoice.amount)))?;

        let Some(taken) = self.invoices.take(&invoice.invoice_id).await? else {
            log::info!("Invoice {} was already applied by a concurrent delivery", invoice.invoice_id);
            return Err(AppError::InvoiceNotFound(invoice.invoice_id));
        };

        let expires_at = now + chrono::Duration::days(days);
        let upgraded = self
            .store
            .update(
                taken.account_id,
                Box::new(move |acc: &mut Account| {
                    acc.apply_upgrade(expires_at);
                    Ok(())
                }),
            )
            .await;

        match upgraded {
            Ok(account) => {
                log::info!(
                    "Payment applied: invoice={} account={} premium until {}",
                    taken.invoice_id,
                    account.id,
                    expires_at
                );
                Ok(IpnOutcome::Applied {
                    account,
                    invoice_id: taken.invoice_id,
                    days,
                })
            }
            Err(err) => {
                log::error!("Upgrade for invoice {} failed, restoring invoice: {}", taken.invoice_id, err);
                if let Err(restore_err) = self.invoices.insert(taken).await {
                    log::error!("Failed to restore invoice: {}", restore_err);
                }
                Err(err)
            }
        }
    }

    async fn locate(&self, payload: &Value) -> AppResult<PendingInvoice> {
        let invoice_id = payload.get("invoice_id").and_then(value_to_string);
        if let Some(id) = &invoice_id {
            if let Some(invoice) = self.invoices.find(id).await? {
                return Ok(invoice);
            }
        }

        let order_id = payload.get("order_id").and_then(value_to_string);
        if let Some(order) = &order_id {
            if let Some(invoice) = self.invoices.find_by_order(order).await? {
                return Ok(invoice);
            }
        }

        let reference = invoice_id.or(order_id).unwrap_or_else(|| "<none>".to_string());
        log::warn!("IPN for unknown invoice {}", reference);
        Err(AppError::InvoiceNotFound(reference))
    }

    /// Drop invoices older than the payment window and cancel them upstream
    pub async fn sweep_expired(&self) -> AppResult<usize> {
        let cutoff = self.clock.now() - self.settings.invoice_window;
        let expired = self.invoices.remove_created_before(cutoff).await?;
        for invoice in &expired {
            log::info!("Invoice {} expired unpaid", invoice.invoice_id);
            if let Some(gateway) = &self.gateway {
                if let Err(e) = gateway.cancel_invoice(&invoice.invoice_id).await {
                    log::warn!("Could not cancel invoice {} upstream: {}", invoice.invoice_id, e);
                }
            }
        }
        Ok(expired.len())
    }

    /// Run [`sweep_expired`](Self::sweep_expired) forever on a fixed interval
    pub fn spawn_sweeper(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep_expired().await {
                    log::error!("Invoice sweep failed: {}", e);
                }
            }
        })
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
