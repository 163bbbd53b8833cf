//! End-to-end account journeys across entitlements, admin and payments
//!
//! Run with: cargo test -p grabcore --test scenarios_test

mod common;

use chrono::Duration;
use common::{signed_ipn, TestEnvironment, ADMIN_ID, BACKENDS};
use grabcore::quota::{AccountRef, ActionKind, Plan};
use grabcore::{AppError, IpnOutcome};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Download until the quota runs out, pay, download more, let premium lapse
#[tokio::test]
async fn test_quota_then_upgrade_then_expiry() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        let user = 100;
        env.entitlements.touch(user, Some("frank"), Some(user)).await.unwrap();

        for _ in 0..3 {
            env.entitlements.acquire(user, ActionKind::Download).await.unwrap();
        }
        assert!(matches!(
            env.entitlements.acquire(user, ActionKind::Download).await,
            Err(AppError::QuotaExceeded(ActionKind::Download))
        ));

        let invoice = env.payments.create_invoice(user, 2.0).await.unwrap();
        let body = json!({"invoice_id": invoice.invoice_id.clone(), "payment_status": "finished", "price_amount": 2.0});
        let (raw, sig) = signed_ipn(&body);
        assert!(matches!(
            env.payments.handle_ipn(&raw, Some(&sig)).await.unwrap(),
            IpnOutcome::Applied { days: 30, .. }
        ));

        // counter was at 3, premium downloads go through immediately
        for _ in 0..5 {
            env.entitlements.acquire(user, ActionKind::Download).await.unwrap();
        }

        env.clock.advance(Duration::days(30) + Duration::minutes(1));
        let profile = env.entitlements.profile(user).await.unwrap();
        assert_eq!(profile.plan, Plan::Free, "{:?}", backend);
        assert_eq!(profile.downloads_used, 0);

        for _ in 0..3 {
            env.entitlements.acquire(user, ActionKind::Download).await.unwrap();
        }
        assert!(env.entitlements.acquire(user, ActionKind::Download).await.is_err());
        assert_eq!(env.store.get(user).await.unwrap().unwrap().downloads_total, 11);
    }
}

/// Admin upgrade for a day lifts the quota until it lapses
#[tokio::test]
async fn test_quota_then_admin_upgrade_then_expiry() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        let user = 103;

        for _ in 0..3 {
            env.entitlements.acquire(user, ActionKind::Download).await.unwrap();
        }
        assert!(matches!(
            env.entitlements.acquire(user, ActionKind::Download).await,
            Err(AppError::QuotaExceeded(ActionKind::Download))
        ));

        env.admin.upgrade(ADMIN_ID, &AccountRef::Id(user), Duration::hours(24)).await.unwrap();
        env.entitlements.acquire(user, ActionKind::Download).await.unwrap();

        env.clock.advance(Duration::hours(24));
        let profile = env.entitlements.profile(user).await.unwrap();
        assert_eq!(profile.plan, Plan::Free, "{:?}", backend);
        assert!(profile.expires_at.is_none());
    }
}

/// A trial used on the free plan stays used after a premium period ends
#[tokio::test]
async fn test_trial_survives_upgrade_and_downgrade() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        let user = 101;

        env.entitlements.acquire(user, ActionKind::VideoToGif).await.unwrap();
        env.admin.upgrade(ADMIN_ID, &AccountRef::Id(user), Duration::days(7)).await.unwrap();
        env.entitlements.acquire(user, ActionKind::VideoToGif).await.unwrap();
        env.admin.downgrade(ADMIN_ID, &AccountRef::Id(user)).await.unwrap();

        assert!(matches!(
            env.entitlements.acquire(user, ActionKind::VideoToGif).await,
            Err(AppError::QuotaExceeded(ActionKind::VideoToGif))
        ));
        // the other trials were never touched
        env.entitlements.acquire(user, ActionKind::TextToPdf).await.unwrap();
    }
}

/// A forged payment notification leaves the account and invoice alone
#[tokio::test]
async fn test_forged_ipn_changes_nothing() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        let user = 102;
        env.entitlements.touch(user, Some("grace"), Some(user)).await.unwrap();
        let invoice = env.payments.create_invoice(user, 4.0).await.unwrap();
        let before = env.store.get(user).await.unwrap().unwrap();

        let body = json!({"invoice_id": invoice.invoice_id.clone(), "payment_status": "finished", "price_amount": 4});
        let raw = serde_json::to_vec(&body).unwrap();
        let forged = grabcore::payment::signature::sign("guessed-secret", &body);

        assert!(matches!(
            env.payments.handle_ipn(&raw, Some(&forged)).await,
            Err(AppError::InvalidSignature)
        ));
        assert_eq!(env.store.get(user).await.unwrap().unwrap(), before);
        assert!(env.invoices.find(&invoice.invoice_id).await.unwrap().is_some());

        // the genuine notification still works afterwards
        let (raw, sig) = signed_ipn(&body);
        assert!(env.payments.handle_ipn(&raw, Some(&sig)).await.is_ok());
        assert_eq!(env.store.get(user).await.unwrap().unwrap().plan, Plan::Premium);
    }
}
