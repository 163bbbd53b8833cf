//! Metrics collection using Prometheus
//!
//! Tracks entitlement decisions, ephemeral file churn, payment outcomes and
//! broadcast deliveries. Exposed as text on `/metrics` by the web server.

// Registration only fails on duplicate names, which is a programming error.
#![allow(clippy::expect_used)]

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

/// Entitlement decisions
/// Labels: action (download/image_pdf/text_pdf/video_gif), outcome (allowed/quota/banned/released)
pub static ENTITLEMENT_DECISIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "grab_entitlement_decisions_total",
        "Entitlement decisions by action and outcome",
        &["action", "outcome"]
    )
    .expect("register grab_entitlement_decisions_total")
});

/// Ephemeral file lifecycle
/// Labels: event (registered/deleted/purged)
pub static EPHEMERAL_FILES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "grab_ephemeral_files_total",
        "Ephemeral file registrations and deletions",
        &["event"]
    )
    .expect("register grab_ephemeral_files_total")
});

/// Files currently addressable through the registry
pub static EPHEMERAL_FILES_LIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("grab_ephemeral_files_live", "Files currently held by the registry")
        .expect("register grab_ephemeral_files_live")
});

/// Payment notifications
/// Labels: outcome (applied/ignored/invalid_signature/not_found/expired/amount_mismatch/error)
pub static PAYMENT_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "grab_payment_events_total",
        "Payment notifications by outcome",
        &["outcome"]
    )
    .expect("register grab_payment_events_total")
});

/// Broadcast deliveries
/// Labels: outcome (delivered/failed)
pub static BROADCAST_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "grab_broadcast_deliveries_total",
        "Broadcast message deliveries by outcome",
        &["outcome"]
    )
    .expect("register grab_broadcast_deliveries_total")
});

/// Touch every metric so it shows up in `/metrics` before the first event
pub fn init_metrics() {
    log::info!("Initializing metrics registry...");

    for action in ["download", "image_pdf", "text_pdf", "video_gif"] {
        for outcome in ["allowed", "quota", "banned"] {
            ENTITLEMENT_DECISIONS_TOTAL.with_label_values(&[action, outcome]);
        }
    }
    for event in ["registered", "deleted"] {
        EPHEMERAL_FILES_TOTAL.with_label_values(&[event]);
    }
    Lazy::force(&EPHEMERAL_FILES_LIVE);
    for outcome in ["applied", "ignored", "invalid_signature", "not_found", "expired", "amount_mismatch"] {
        PAYMENT_EVENTS_TOTAL.with_label_values(&[outcome]);
    }
    for outcome in ["delivered", "failed"] {
        BROADCAST_DELIVERIES_TOTAL.with_label_values(&[outcome]);
    }

    log::info!("Metrics registry initialized");
}

/// Render the default registry in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        init_metrics();
        PAYMENT_EVENTS_TOTAL.with_label_values(&["applied"]).inc();
        let text = render().unwrap();
        assert!(text.contains("grab_payment_events_total"));
        assert!(text.contains("grab_entitlement_decisions_total"));
    }
}
