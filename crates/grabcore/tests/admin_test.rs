//! Admin operations: authorization, plan changes, stats, export, broadcast
//!
//! Run with: cargo test -p grabcore --test admin_test

mod common;

use chrono::Duration;
use common::{RecordingSink, TestEnvironment, ADMIN_ID, BACKENDS};
use grabcore::quota::{AccountRef, ActionKind, Plan};
use grabcore::{AppError, Clock};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_non_admin_is_forbidden_without_mutation() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        env.entitlements.touch(30, Some("target"), Some(30)).await.unwrap();
        let before = env.store.get(30).await.unwrap().unwrap();
        let intruder = 31;
        let target = AccountRef::Id(30);
        let sink = RecordingSink::default();

        assert!(matches!(
            env.admin.upgrade(intruder, &target, Duration::days(30)).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(env.admin.downgrade(intruder, &target).await, Err(AppError::Forbidden(_))));
        assert!(matches!(env.admin.ban(intruder, &target).await, Err(AppError::Forbidden(_))));
        assert!(matches!(env.admin.unban(intruder, &target).await, Err(AppError::Forbidden(_))));
        assert!(matches!(env.admin.stats(intruder).await, Err(AppError::Forbidden(_))));
        assert!(matches!(env.admin.export_csv(intruder).await, Err(AppError::Forbidden(_))));
        assert!(matches!(
            env.admin.broadcast(intruder, "hi", &sink).await,
            Err(AppError::Forbidden(_))
        ));

        assert_eq!(env.store.get(30).await.unwrap().unwrap(), before);
        assert!(sink.delivered.lock().unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_upgrade_by_username_resets_counter() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        env.entitlements.touch(32, Some("@Dana"), Some(32)).await.unwrap();
        for _ in 0..3 {
            env.entitlements.acquire(32, ActionKind::Download).await.unwrap();
        }

        let account = env
            .admin
            .upgrade(ADMIN_ID, &"@dana".parse::<AccountRef>().unwrap(), Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(account.plan, Plan::Premium);
        assert_eq!(account.downloads_used, 0);
        assert_eq!(account.expires_at, Some(env.clock.now() + Duration::hours(24)));
    }
}

#[tokio::test]
async fn test_downgrade_keeps_trials_and_blocks_them() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        env.entitlements.acquire(33, ActionKind::ImageToPdf).await.unwrap();
        env.admin.upgrade(ADMIN_ID, &AccountRef::Id(33), Duration::days(30)).await.unwrap();
        env.entitlements.acquire(33, ActionKind::ImageToPdf).await.unwrap();

        let account = env.admin.downgrade(ADMIN_ID, &AccountRef::Id(33)).await.unwrap();
        assert_eq!(account.plan, Plan::Free);
        assert_eq!(account.expires_at, None);
        assert!(account.trials.pdf_used);
        assert!(matches!(
            env.entitlements.acquire(33, ActionKind::ImageToPdf).await,
            Err(AppError::QuotaExceeded(ActionKind::ImageToPdf))
        ));
    }
}

#[tokio::test]
async fn test_unknown_target_is_not_found() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        assert!(matches!(
            env.admin.upgrade(ADMIN_ID, &AccountRef::Id(404), Duration::days(1)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            env.admin.unban(ADMIN_ID, &AccountRef::Username("nobody".into())).await,
            Err(AppError::NotFound(_))
        ));
        assert!(env.store.get(404).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn test_stats_reflect_lazy_expiry() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        for id in [40, 41, 42] {
            env.store.get_or_create(id).await.unwrap();
        }
        env.admin.upgrade(ADMIN_ID, &AccountRef::Id(40), Duration::hours(1)).await.unwrap();
        env.admin.upgrade(ADMIN_ID, &AccountRef::Id(41), Duration::days(10)).await.unwrap();
        env.admin.ban(ADMIN_ID, &AccountRef::Id(42)).await.unwrap();
        env.entitlements.acquire(41, ActionKind::Download).await.unwrap();

        env.clock.advance(Duration::hours(2));
        let stats = env.admin.stats(ADMIN_ID).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.premium, 1);
        assert_eq!(stats.free, 2);
        assert_eq!(stats.banned, 1);
        assert_eq!(stats.downloads_total, 1);
    }
}

#[tokio::test]
async fn test_export_csv_columns() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        env.entitlements.touch(50, Some("erin"), Some(50)).await.unwrap();
        env.entitlements.acquire(50, ActionKind::VideoToGif).await.unwrap();
        env.entitlements.acquire(50, ActionKind::Download).await.unwrap();
        env.store.get_or_create(51).await.unwrap();

        let csv = env.admin.export_csv(ADMIN_ID).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "id,username,plan,expires_at,banned,pdf_trial_used,gif_trial_used,text_pdf_trial_used,downloads_used,downloads_total"
        );
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "50,erin,free,,false,false,true,false,1,1");
        assert!(lines[2].starts_with("51,,free,"));
    }
}

#[tokio::test]
async fn test_broadcast_counts_partial_failures() {
    for backend in BACKENDS {
        let env = TestEnvironment::new(backend);
        for id in [60, 61, 62, 63] {
            env.entitlements.touch(id, None, Some(id * 10)).await.unwrap();
        }
        env.admin.ban(ADMIN_ID, &AccountRef::Id(63)).await.unwrap();

        let sink = RecordingSink::failing(vec![610]);
        let report = env.admin.broadcast(ADMIN_ID, "New formats supported!", &sink).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);

        let delivered = sink.delivered.lock().unwrap().clone();
        assert_eq!(
            delivered,
            vec![(600, "New formats supported!".to_string()), (620, "New formats supported!".to_string())]
        );
    }
}
