//! Daily in-process schedule for bot mode.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use tracing::{error, info, warn};

use super::BotContext;
use crate::delivery::ChatTransport;
use crate::pipeline::{self, RunStatus};

/// First occurrence of `at` (UTC) strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Run the batch pipeline every day at `at`, delivering to the configured
/// chat target. Never returns.
pub(crate) async fn run_daily(ctx: Arc<BotContext>, transport: Option<ChatTransport>, at: NaiveTime) {
    if transport.is_none() {
        warn!("Scheduled digest has no chat target; only artifacts will be written");
    }

    loop {
        let now = Utc::now();
        let next = next_run_after(now, at);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(%next, wait_secs = wait.as_secs(), "Next scheduled digest");
        tokio::time::sleep(wait).await;

        let output_dir = ctx.config.output_dir().map(|p| p.as_path());
        match pipeline::run(
            &ctx.config,
            &ctx.source,
            &ctx.model,
            transport.as_ref(),
            output_dir,
        )
        .await
        {
            Ok(report) if report.status == RunStatus::Degraded => {
                warn!(error = ?report.delivery_error, "Scheduled digest degraded");
            }
            Ok(report) => info!(posts = report.posts, "Scheduled digest delivered"),
            Err(e) => error!(error = %e, "Scheduled digest failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 5, 6, 6, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(7, 30)),
            Utc.with_ymd_and_hms(2025, 5, 6, 7, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_already_passed_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2025, 5, 6, 8, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(7, 30)),
            Utc.with_ymd_and_hms(2025, 5, 7, 7, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_exact_time_is_not_rerun() {
        let now = Utc.with_ymd_and_hms(2025, 12, 31, 7, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, at(7, 30)),
            Utc.with_ymd_and_hms(2026, 1, 1, 7, 30, 0).unwrap()
        );
    }
}
