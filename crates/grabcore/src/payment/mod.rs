//! Crypto payments through NOWPayments
//!
//! - `gateway`: REST client that creates and cancels hosted invoices
//! - `signature`: IPN authenticity check
//! - `service`: invoice bookkeeping and the IPN → premium upgrade flow

pub mod gateway;
pub mod service;
pub mod signature;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::config;
use crate::quota::AccountId;

pub use gateway::{CreatedInvoice, InvoiceRequest, NowPaymentsClient, PaymentGateway};
pub use service::{IpnOutcome, PaymentService};

/// Invoice created for an account and not yet paid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingInvoice {
    pub invoice_id: String,
    pub order_id: String,
    pub account_id: AccountId,
    /// USD
    pub amount: f64,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingTier {
    /// USD
    pub amount: f64,
    pub days: i64,
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub ipn_secret: String,
    pub invoice_window: chrono::Duration,
    pub amount_epsilon: f64,
    pub tiers: Vec<PricingTier>,
    /// Base URL for `<base>/ipn`
    pub callback_base_url: Option<String>,
    pub success_url: Option<String>,
}

impl PaymentSettings {
    pub fn from_config() -> Self {
        Self {
            ipn_secret: config::payment::NOWPAYMENTS_IPN_SECRET.clone(),
            invoice_window: chrono::Duration::minutes(config::payment::INVOICE_WINDOW_MINUTES),
            amount_epsilon: config::payment::AMOUNT_EPSILON,
            tiers: config::payment::TIERS
                .iter()
                .map(|&(amount, days)| PricingTier { amount, days })
                .collect(),
            callback_base_url: config::APP_URL.clone(),
            success_url: config::CHANNEL_URL.clone(),
        }
    }

    /// Tier whose price matches `amount` within the epsilon
    pub fn tier_for(&self, amount: f64) -> Option<PricingTier> {
        self.tiers
            .iter()
            .copied()
            .find(|tier| (tier.amount - amount).abs() <= self.amount_epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_lookup() {
        let mut settings = PaymentSettings::from_config();
        settings.tiers = vec![
            PricingTier { amount: 2.0, days: 30 },
            PricingTier { amount: 4.0, days: 60 },
        ];
        assert_eq!(settings.tier_for(2.0).map(|t| t.days), Some(30));
        assert_eq!(settings.tier_for(4.005).map(|t| t.days), Some(60));
        assert_eq!(settings.tier_for(3.0), None);
    }
}
