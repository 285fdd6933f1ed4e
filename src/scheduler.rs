//! Reply timing: decide *when* an agent reply goes out.
//!
//! Transactional questions (hours, stock, price, address) always get an
//! instant answer. Rapport-building chatter can be delayed per dealership
//! settings so replies feel human: a fixed custom delay, or a delay only
//! during business hours in the dealership's timezone. Jitter of ±15 s keeps
//! the timing from looking robotic.
//!
//! Delayed sends run as cancellable tokio tasks; cancelling the handle
//! before the timer fires suppresses the send entirely.

use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Hard ceiling on any configured delay, in seconds.
pub const MAX_DELAY_SECONDS: f64 = 300.0;

/// Jitter applied to non-instant delays, in seconds.
pub const JITTER_RANGE_SECONDS: f64 = 15.0;

/// Default custom delay.
pub const DEFAULT_DELAY_SECONDS: f64 = 30.0;

/// Default business-hours delay.
pub const DEFAULT_BUSINESS_HOURS_DELAY_SECONDS: f64 = 60.0;

/// Queries that always get an instant reply.
const TRANSACTIONAL_PATTERNS: &[&str] = &[
    // Hours
    "hours", "open", "closed", "when are you", "what time",
    // Inventory
    "in stock", "available", "do you have", "inventory", "stock",
    // Pricing
    "price", "cost", "how much", "pricing",
    // Location
    "address", "location", "where are you", "directions",
    // Contact
    "phone", "number", "call", "contact",
];

/// Reply timing mode, resolved from dealership settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTimingMode {
    /// Always send immediately.
    Instant,
    /// Fixed delay with jitter.
    CustomDelay,
    /// Delay only inside the configured business-hours window.
    BusinessHours,
}

impl ReplyTimingMode {
    /// Parse from the stored settings value; unknown modes fall back to
    /// instant with a warning.
    pub fn parse(s: &str) -> Self {
        match s {
            "custom_delay" => Self::CustomDelay,
            "business_hours" => Self::BusinessHours,
            "instant" => Self::Instant,
            other => {
                warn!(mode = %other, "unknown reply timing mode, using instant");
                Self::Instant
            }
        }
    }
}

/// Effective reply-timing settings for one dealership.
#[derive(Debug, Clone)]
pub struct ReplyTimingSettings {
    pub mode: ReplyTimingMode,
    pub reply_delay_seconds: f64,
    pub business_hours_start: String,
    pub business_hours_end: String,
    pub business_hours_delay_seconds: f64,
    /// IANA timezone of the dealership, e.g. `America/New_York`.
    pub timezone: String,
}

impl Default for ReplyTimingSettings {
    fn default() -> Self {
        Self {
            mode: ReplyTimingMode::Instant,
            reply_delay_seconds: DEFAULT_DELAY_SECONDS,
            business_hours_start: "09:00".to_owned(),
            business_hours_end: "17:00".to_owned(),
            business_hours_delay_seconds: DEFAULT_BUSINESS_HOURS_DELAY_SECONDS,
            timezone: "America/New_York".to_owned(),
        }
    }
}

/// The scheduling decision for one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayPlan {
    pub delayed: bool,
    pub delay: StdDuration,
    pub reason: &'static str,
}

impl DelayPlan {
    fn instant(reason: &'static str) -> Self {
        Self {
            delayed: false,
            delay: StdDuration::ZERO,
            reason,
        }
    }
}

/// Decide whether and how long to delay a reply to `message` at `now`.
pub fn plan_reply(message: &str, settings: &ReplyTimingSettings, now: DateTime<Utc>) -> DelayPlan {
    if is_transactional(message) {
        return DelayPlan::instant("transactional query");
    }

    match settings.mode {
        ReplyTimingMode::Instant => DelayPlan::instant("instant mode"),
        ReplyTimingMode::CustomDelay => DelayPlan {
            delayed: true,
            delay: with_jitter(settings.reply_delay_seconds),
            reason: "custom delay mode",
        },
        ReplyTimingMode::BusinessHours => {
            if in_business_hours(settings, now) {
                DelayPlan {
                    delayed: true,
                    delay: with_jitter(settings.business_hours_delay_seconds),
                    reason: "business hours delay",
                }
            } else {
                DelayPlan::instant("after hours")
            }
        }
    }
}

/// Whether the message matches the transactional keyword set.
pub fn is_transactional(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSACTIONAL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Clamp the configured delay to `0..=300` and add ±15 s of jitter,
/// flooring at zero.
fn with_jitter(configured_seconds: f64) -> StdDuration {
    let base = configured_seconds.clamp(0.0, MAX_DELAY_SECONDS);
    let jitter = rand::thread_rng().gen_range(-JITTER_RANGE_SECONDS..=JITTER_RANGE_SECONDS);
    StdDuration::from_secs_f64((base + jitter).max(0.0))
}

/// Whether `now` falls inside the dealership's business-hours window.
///
/// `start > end` means the window wraps midnight (e.g. 22:00–06:00).
/// Unparseable times default to "inside hours" so a misconfigured window
/// degrades to delayed-but-sent rather than never-delayed.
fn in_business_hours(settings: &ReplyTimingSettings, now: DateTime<Utc>) -> bool {
    let (Some(start), Some(end)) = (
        parse_hhmm(&settings.business_hours_start),
        parse_hhmm(&settings.business_hours_end),
    ) else {
        warn!(
            start = %settings.business_hours_start,
            end = %settings.business_hours_end,
            "unparseable business hours, treating as inside hours"
        );
        return true;
    };

    let local_time = match settings.timezone.parse::<Tz>() {
        Ok(tz) => now.with_timezone(&tz).time(),
        Err(_) => {
            warn!(timezone = %settings.timezone, "unknown timezone, using UTC");
            now.time()
        }
    };
    let current = NaiveTime::from_hms_opt(local_time.hour(), local_time.minute(), 0)
        .unwrap_or(local_time);

    if start > end {
        current >= start || current <= end
    } else {
        start <= current && current <= end
    }
}

/// Parse an `HH:MM` time-of-day string.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Handle to an in-flight delayed send.
#[derive(Debug)]
pub struct ScheduledReply {
    cancel_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
    /// The planned delay, for callers that report timing.
    pub delay: StdDuration,
}

impl ScheduledReply {
    /// Cancel the send. A no-op if the timer already fired.
    pub fn cancel(self) {
        let _ = self.cancel_tx.send(());
        self.handle.abort();
    }

    /// Wait for the delayed send to complete (used by tests and shutdown).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Outcome of scheduling one reply.
#[derive(Debug)]
pub enum ScheduleOutcome {
    /// The send callback ran inline.
    SentImmediately,
    /// The send is pending on a timer; cancel via the handle.
    Scheduled(ScheduledReply),
}

/// Execute the plan: send now, or spawn a cancellable timer task.
pub async fn execute<F, Fut>(plan: DelayPlan, send: F) -> ScheduleOutcome
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    if !plan.delayed {
        info!(reason = plan.reason, "sending instant reply");
        send().await;
        return ScheduleOutcome::SentImmediately;
    }

    info!(
        delay_secs = plan.delay.as_secs_f64(),
        reason = plan.reason,
        "scheduling delayed reply"
    );
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let delay = plan.delay;
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(delay) => send().await,
            _ = cancel_rx => {}
        }
    });

    ScheduleOutcome::Scheduled(ScheduledReply {
        cancel_tx,
        handle,
        delay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn business_hours_settings() -> ReplyTimingSettings {
        ReplyTimingSettings {
            mode: ReplyTimingMode::BusinessHours,
            business_hours_delay_seconds: 60.0,
            ..ReplyTimingSettings::default()
        }
    }

    /// 10:30 local in America/New_York on a summer date (EDT, UTC-4).
    fn ny_mid_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).single().expect("valid")
    }

    /// 22:00 local in America/New_York (EDT).
    fn ny_late_evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, 2, 0, 0).single().expect("valid")
    }

    #[test]
    fn transactional_is_always_instant() {
        let settings = ReplyTimingSettings {
            mode: ReplyTimingMode::CustomDelay,
            ..ReplyTimingSettings::default()
        };
        let plan = plan_reply("what's the price on the camry?", &settings, Utc::now());
        assert!(!plan.delayed);
    }

    #[test]
    fn custom_delay_within_bounds() {
        let settings = ReplyTimingSettings {
            mode: ReplyTimingMode::CustomDelay,
            reply_delay_seconds: 60.0,
            ..ReplyTimingSettings::default()
        };
        for _ in 0..50 {
            let plan = plan_reply("thanks!", &settings, Utc::now());
            assert!(plan.delayed);
            let secs = plan.delay.as_secs_f64();
            assert!((45.0..=75.0).contains(&secs), "delay {secs} out of range");
        }
    }

    #[test]
    fn custom_delay_clamps_to_max() {
        let settings = ReplyTimingSettings {
            mode: ReplyTimingMode::CustomDelay,
            reply_delay_seconds: 10_000.0,
            ..ReplyTimingSettings::default()
        };
        for _ in 0..50 {
            let plan = plan_reply("thanks!", &settings, Utc::now());
            let secs = plan.delay.as_secs_f64();
            assert!(secs <= MAX_DELAY_SECONDS + JITTER_RANGE_SECONDS);
        }
    }

    #[test]
    fn zero_delay_never_goes_negative() {
        let settings = ReplyTimingSettings {
            mode: ReplyTimingMode::CustomDelay,
            reply_delay_seconds: 0.0,
            ..ReplyTimingSettings::default()
        };
        for _ in 0..50 {
            let plan = plan_reply("thanks!", &settings, Utc::now());
            assert!(plan.delay.as_secs_f64() >= 0.0);
        }
    }

    #[test]
    fn business_hours_delays_inside_window() {
        let plan = plan_reply("thanks!", &business_hours_settings(), ny_mid_morning());
        assert!(plan.delayed);
        let secs = plan.delay.as_secs_f64();
        assert!((45.0..=75.0).contains(&secs));
    }

    #[test]
    fn business_hours_instant_after_hours() {
        let plan = plan_reply("thanks!", &business_hours_settings(), ny_late_evening());
        assert!(!plan.delayed);
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let settings = ReplyTimingSettings {
            mode: ReplyTimingMode::BusinessHours,
            business_hours_start: "22:00".to_owned(),
            business_hours_end: "06:00".to_owned(),
            ..ReplyTimingSettings::default()
        };
        // 22:00 local is inside the wrapped window.
        let plan = plan_reply("thanks!", &settings, ny_late_evening());
        assert!(plan.delayed);
        // 10:30 local is outside.
        let plan = plan_reply("thanks!", &settings, ny_mid_morning());
        assert!(!plan.delayed);
    }

    #[test]
    fn parse_hhmm_accepts_valid_rejects_invalid() {
        assert!(parse_hhmm("09:00").is_some());
        assert!(parse_hhmm("23:59").is_some());
        assert!(parse_hhmm("25:00").is_none());
        assert!(parse_hhmm("nope").is_none());
        assert!(parse_hhmm("9").is_none());
    }

    #[test]
    fn unknown_mode_parses_to_instant() {
        assert_eq!(ReplyTimingMode::parse("warp_speed"), ReplyTimingMode::Instant);
        assert_eq!(ReplyTimingMode::parse("custom_delay"), ReplyTimingMode::CustomDelay);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_send_fires_after_sleep() {
        let sent = Arc::new(AtomicBool::new(false));
        let sent_clone = Arc::clone(&sent);
        let plan = DelayPlan {
            delayed: true,
            delay: StdDuration::from_secs(60),
            reason: "test",
        };
        let outcome = execute(plan, move || async move {
            sent_clone.store(true, Ordering::SeqCst);
        })
        .await;

        let ScheduleOutcome::Scheduled(reply) = outcome else {
            panic!("expected a scheduled reply");
        };
        assert!(!sent.load(Ordering::SeqCst));
        tokio::time::advance(StdDuration::from_secs(61)).await;
        reply.join().await;
        assert!(sent.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_send_never_fires() {
        let sent = Arc::new(AtomicBool::new(false));
        let sent_clone = Arc::clone(&sent);
        let plan = DelayPlan {
            delayed: true,
            delay: StdDuration::from_secs(60),
            reason: "test",
        };
        let outcome = execute(plan, move || async move {
            sent_clone.store(true, Ordering::SeqCst);
        })
        .await;

        let ScheduleOutcome::Scheduled(reply) = outcome else {
            panic!("expected a scheduled reply");
        };
        reply.cancel();
        tokio::time::advance(StdDuration::from_secs(120)).await;
        assert!(!sent.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn instant_plan_sends_inline() {
        let sent = Arc::new(AtomicBool::new(false));
        let sent_clone = Arc::clone(&sent);
        let plan = DelayPlan::instant("test");
        let outcome = execute(plan, move || async move {
            sent_clone.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(matches!(outcome, ScheduleOutcome::SentImmediately));
        assert!(sent.load(Ordering::SeqCst));
    }
}
