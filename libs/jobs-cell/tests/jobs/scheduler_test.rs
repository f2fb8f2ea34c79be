use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};

use crate::setup_ops;
use shared_database::{tables, RecordStoreExt};
use shared_models::NotificationStatus;
use shared_utils::test_utils::{fixed_now, notification, TestKeys};

#[tokio::test]
async fn jobs_report_their_next_fire_time() {
    let ops = setup_ops().await;
    let jobs = ops.scheduler.jobs().await;

    let names: Vec<&str> = jobs.iter().map(|job| job.name.as_str()).collect();
    assert_eq!(names, vec!["expiration-check", "cleanup", "alert-check"]);

    // fixed_now() is 2026-06-15 12:00 UTC.
    let at = |h, m| Utc.with_ymd_and_hms(2026, 6, 15, h, m, 0).unwrap();
    assert_eq!(jobs[0].next_run, Some(Utc.with_ymd_and_hms(2026, 6, 16, 9, 0, 0).unwrap()));
    assert_eq!(jobs[1].next_run, Some(Utc.with_ymd_and_hms(2026, 6, 16, 3, 0, 0).unwrap()));
    assert_eq!(jobs[2].next_run, Some(at(12, 5)));
    assert!(jobs.iter().all(|job| !job.running));
}

#[tokio::test]
async fn run_all_now_executes_every_job_and_logs_each_run() {
    let ops = setup_ops().await;
    ops.store
        .insert_record(
            tables::API_KEYS,
            &TestKeys::expiring_in("soon", fixed_now(), Duration::days(5)),
        )
        .await
        .unwrap();
    ops.store
        .insert_record(
            tables::NOTIFICATIONS,
            &notification(NotificationStatus::Sent, fixed_now() - Duration::days(45)),
        )
        .await
        .unwrap();

    let results = ops.scheduler.run_all_now().await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|result| result.success));
    assert_eq!(results[0].details["sent"], 1);
    assert_eq!(results[1].details["notifications_deleted"], 1);

    assert_eq!(ops.store.rows(tables::JOB_LOGS).await.len(), 3);
    assert_eq!(ops.scheduler.last_results().await.len(), 3);
}

#[tokio::test]
async fn started_scheduler_fires_on_schedule_and_stops_cleanly() {
    let ops = setup_ops().await;
    // The alert check fires every five minutes; wall-clock sleeps are derived
    // from the manual clock, so put it one second before the next slot.
    ops.clock.set(Utc.with_ymd_and_hms(2026, 6, 15, 12, 4, 59).unwrap());

    ops.scheduler.start().await.unwrap();
    assert!(ops.scheduler.start().await.is_err());

    let mut fired = false;
    for _ in 0..50 {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        if ops.scheduler.last_results().await.contains_key("alert-check") {
            fired = true;
            break;
        }
    }
    ops.scheduler.stop().await;

    assert!(fired, "alert-check should have fired within the test window");
    assert!(!ops.scheduler.last_results().await.contains_key("cleanup"));
}
