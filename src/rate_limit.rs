//! Per-conversation report quotas, counted from the report audit log.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Utc};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::ReportKind;
use crate::state::AppState;
use crate::store::{ReportLog, WindowStart};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    /// Resets at local midnight for the given offset.
    CalendarDay { offset: FixedOffset },
    Trailing { length: Duration },
}

impl ReportWindow {
    /// The day window is `[local midnight, now]`; the trailing window is
    /// `(now - length, now]`.
    pub fn start(&self, now: DateTime<Utc>) -> WindowStart {
        match self {
            ReportWindow::CalendarDay { offset } => {
                let local = now.with_timezone(offset);
                let midnight = local.date_naive().and_time(NaiveTime::MIN);
                let offset_duration = Duration::seconds(i64::from(offset.local_minus_utc()));
                WindowStart::Inclusive(DateTime::from_naive_utc_and_offset(
                    midnight - offset_duration,
                    Utc,
                ))
            }
            ReportWindow::Trailing { length } => WindowStart::Exclusive(now - *length),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ReportWindow::CalendarDay { .. } => "per day".to_string(),
            ReportWindow::Trailing { length } if *length == Duration::hours(1) => {
                "per hour".to_string()
            }
            ReportWindow::Trailing { length } => format!("per {} minutes", length.num_minutes()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuota {
    pub kind: ReportKind,
    pub cap: i64,
    pub window: ReportWindow,
}

impl ReportQuota {
    pub fn for_kind(config: &AppConfig, kind: ReportKind) -> Self {
        match kind {
            ReportKind::Message => {
                let offset = FixedOffset::east_opt(config.report_day_utc_offset_minutes * 60)
                    .unwrap_or_else(|| Utc.fix());
                Self {
                    kind,
                    cap: config.message_report_daily_cap,
                    window: ReportWindow::CalendarDay { offset },
                }
            }
            ReportKind::Chat => Self {
                kind,
                cap: config.chat_report_hourly_cap,
                window: ReportWindow::Trailing {
                    length: Duration::hours(1),
                },
            },
        }
    }

    fn exceeded_message(&self) -> String {
        format!(
            "report limit reached: at most {} {} reports {} for this conversation",
            self.cap,
            self.kind.as_str(),
            self.window.describe()
        )
    }
}

/// Fails with `RateLimited` once the user has used up the quota for this
/// target within the current window.
pub async fn check_quota(
    state: &AppState,
    quota: &ReportQuota,
    user_id: Uuid,
    target_id: Uuid,
) -> ServiceResult<()> {
    let now = state.clock.now();
    let since = quota.window.start(now);
    let used = state
        .store
        .count_reports_since(user_id, target_id, quota.kind, since)
        .await?;
    if used >= quota.cap {
        return Err(ServiceError::RateLimited(quota.exceeded_message()));
    }
    Ok(())
}
