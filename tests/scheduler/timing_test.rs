//! Reply timing end-to-end: planning plus the cancellable delayed send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use lotline::scheduler::{
    execute, plan_reply, DelayPlan, ReplyTimingMode, ReplyTimingSettings, ScheduleOutcome,
};
use tokio::sync::Mutex;

fn business_hours_dealership() -> ReplyTimingSettings {
    ReplyTimingSettings {
        mode: ReplyTimingMode::BusinessHours,
        business_hours_start: "09:00".to_owned(),
        business_hours_end: "17:00".to_owned(),
        business_hours_delay_seconds: 60.0,
        timezone: "America/New_York".to_owned(),
        ..ReplyTimingSettings::default()
    }
}

/// 10:30 local in America/New_York during EDT.
fn mid_morning_utc() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).single().expect("valid")
}

#[test]
fn rapport_message_during_business_hours_is_delayed_45_to_75() {
    let settings = business_hours_dealership();
    for _ in 0..25 {
        let plan = plan_reply("thanks!", &settings, mid_morning_utc());
        assert!(plan.delayed);
        let secs = plan.delay.as_secs_f64();
        assert!((45.0..=75.0).contains(&secs), "delay {secs} outside [45, 75]");
    }
}

#[test]
fn transactional_message_is_instant_even_during_business_hours() {
    let settings = business_hours_dealership();
    let plan = plan_reply("what are your hours?", &settings, mid_morning_utc());
    assert!(!plan.delayed);
    assert_eq!(plan.delay, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn delayed_send_fires_no_earlier_than_the_floor() {
    // Scenario: the agent turn recorded by the send callback must trail the
    // inbound by at least the lower jitter bound.
    let sent_at: Arc<Mutex<Option<tokio::time::Instant>>> = Arc::new(Mutex::new(None));
    let sent_at_clone = Arc::clone(&sent_at);
    let started = tokio::time::Instant::now();

    let plan = DelayPlan {
        delayed: true,
        delay: Duration::from_secs(45),
        reason: "test",
    };
    let outcome = execute(plan, move || async move {
        *sent_at_clone.lock().await = Some(tokio::time::Instant::now());
    })
    .await;

    let ScheduleOutcome::Scheduled(handle) = outcome else {
        panic!("expected a scheduled send");
    };

    // Not yet fired before the floor.
    tokio::time::advance(Duration::from_secs(44)).await;
    tokio::task::yield_now().await;
    assert!(sent_at.lock().await.is_none());

    tokio::time::advance(Duration::from_secs(2)).await;
    handle.join().await;

    let fired = sent_at.lock().await.expect("send fired");
    assert!(fired.duration_since(started) >= Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_fire_suppresses_the_send() {
    let sent = Arc::new(AtomicBool::new(false));
    let sent_clone = Arc::clone(&sent);

    let plan = DelayPlan {
        delayed: true,
        delay: Duration::from_secs(60),
        reason: "test",
    };
    let outcome = execute(plan, move || async move {
        sent_clone.store(true, Ordering::SeqCst);
    })
    .await;

    let ScheduleOutcome::Scheduled(handle) = outcome else {
        panic!("expected a scheduled send");
    };
    handle.cancel();

    tokio::time::advance(Duration::from_secs(300)).await;
    tokio::task::yield_now().await;
    assert!(!sent.load(Ordering::SeqCst), "cancelled send must never fire");
}

#[test]
fn after_hours_falls_back_to_instant() {
    let settings = business_hours_dealership();
    // 02:00 UTC is 22:00 EDT the previous evening.
    let late = Utc.with_ymd_and_hms(2025, 6, 3, 2, 0, 0).single().expect("valid");
    let plan = plan_reply("thanks!", &settings, late);
    assert!(!plan.delayed);
}
