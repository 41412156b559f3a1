//! Periodic text rendering of the dashboard views into the log
//!
//! Every configured view runs its own renderer. Each refresh logs one line
//! per target, rolled up over the view's timeframe.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::actors::dashboard::DashboardHandle;
use crate::actors::messages::{TargetStatus, TimeframeSummary};
use crate::config::DashboardView;
use crate::error::PipelineResult;

/// Short label for a timeframe: `45s`, `10m`, `2h`
pub fn format_timeframe(timeframe: Duration) -> String {
    let secs = timeframe.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// One status line for a target
pub fn render_line(summary: &TimeframeSummary) -> String {
    let status = match summary.status {
        TargetStatus::Up => "UP",
        TargetStatus::Degraded => "DEGRADED",
        TargetStatus::Alerting => "ALERTING",
        TargetStatus::Unknown => "UNKNOWN",
    };

    let mut line = format!(
        "[{}] {status:<9} {}",
        format_timeframe(summary.timeframe),
        summary.url
    );

    if let Some(availability) = summary.availability() {
        line.push_str(&format!(
            " | avail {availability:.1}% | avg {}ms | {}/{} ok",
            summary.avg_latency.as_millis(),
            summary.success_count,
            summary.total(),
        ));
    }

    if let Some(alert) = &summary.last_alert {
        line.push_str(&format!(
            " | last alert {} at {}",
            alert.severity,
            alert.triggered_at.format("%H:%M:%S")
        ));
    }

    line
}

/// Log the view every `view.refresh` until cancelled
#[instrument(skip_all, name = "renderer", fields(timeframe = %format_timeframe(view.timeframe)))]
pub async fn render_view(
    dashboard: DashboardHandle,
    view: DashboardView,
    cancel: CancellationToken,
) -> PipelineResult<()> {
    let mut ticker = time::interval(view.refresh);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    // skip the immediate first tick, nothing has been aggregated yet
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(summaries) = dashboard.summarize(view.timeframe).await else {
                    debug!("dashboard stopped, ending renderer");
                    break;
                };
                for summary in summaries.values() {
                    info!("{}", render_line(summary));
                }
            }
        }
    }

    Ok(())
}
