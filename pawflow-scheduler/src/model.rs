use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use pawflow_action::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    OneTime,
    Daily,
    Weekly,
    Monthly,
    Interval,
}

/// Type-specific schedule settings. One struct covers every schedule
/// type; irrelevant fields are simply unused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// One-time: the single run time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_time: Option<DateTime<Local>>,
    /// Interval: minutes between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<i64>,
    /// Interval: delay before the first run.
    #[serde(default)]
    pub initial_delay_minutes: i64,
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    /// Weekly: weekdays to fire on, 0 = Monday.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<u32>,
    /// Monthly: day of month, clamped to the month's actual length.
    #[serde(default = "default_day_of_month")]
    pub day: u32,
}

fn default_day_of_month() -> u32 {
    1
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_time: None,
            interval_minutes: None,
            initial_delay_minutes: 0,
            hour: 0,
            minute: 0,
            days: Vec::new(),
            day: default_day_of_month(),
        }
    }
}

/// A time-based rule that periodically fires a task. `next_run_time` is
/// derived and recomputed on creation, after every fire, and whenever
/// the config changes.
#[derive(Clone)]
pub struct TaskSchedule {
    pub schedule_id: String,
    pub task_id: String,
    pub action: Arc<dyn Action>,
    pub schedule_type: ScheduleType,
    pub config: ScheduleConfig,
    pub enabled: bool,
    pub next_run_time: Option<DateTime<Local>>,
    pub last_run_time: Option<DateTime<Local>>,
}

impl TaskSchedule {
    pub fn new(
        schedule_id: impl Into<String>,
        task_id: impl Into<String>,
        action: Arc<dyn Action>,
        schedule_type: ScheduleType,
        config: ScheduleConfig,
    ) -> Self {
        let next_run_time = compute_next_run(schedule_type, &config, None, Local::now());
        Self {
            schedule_id: schedule_id.into(),
            task_id: task_id.into(),
            action,
            schedule_type,
            config,
            enabled: true,
            next_run_time,
            last_run_time: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.next_run_time {
            Some(next) => now >= next,
            None => false,
        }
    }

    /// Records the fire time and derives the following run.
    pub fn mark_fired(&mut self, now: DateTime<Local>) {
        self.last_run_time = Some(now);
        self.next_run_time =
            compute_next_run(self.schedule_type, &self.config, self.last_run_time, now);
    }

    pub fn recompute(&mut self, now: DateTime<Local>) {
        self.next_run_time =
            compute_next_run(self.schedule_type, &self.config, self.last_run_time, now);
    }
}

/// Pure next-run arithmetic, all in the scheduler's local timezone.
pub fn compute_next_run(
    schedule_type: ScheduleType,
    config: &ScheduleConfig,
    last_run: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    match schedule_type {
        ScheduleType::OneTime => config.run_time.filter(|run_time| *run_time > now),
        ScheduleType::Interval => {
            let minutes = config.interval_minutes.unwrap_or(60).max(1);
            match last_run {
                Some(last) => Some(last + Duration::minutes(minutes)),
                None => Some(now + Duration::minutes(config.initial_delay_minutes.max(0))),
            }
        }
        ScheduleType::Daily => {
            let today = at_time(now.date_naive(), config.hour, config.minute)?;
            if today > now {
                Some(today)
            } else {
                at_time(now.date_naive() + Duration::days(1), config.hour, config.minute)
            }
        }
        ScheduleType::Weekly => {
            let days = if config.days.is_empty() {
                vec![0]
            } else {
                config.days.clone()
            };
            for offset in 0..=7 {
                let date = now.date_naive() + Duration::days(offset);
                if !days.contains(&date.weekday().num_days_from_monday()) {
                    continue;
                }
                if let Some(candidate) = at_time(date, config.hour, config.minute) {
                    if candidate > now {
                        return Some(candidate);
                    }
                }
            }
            None
        }
        ScheduleType::Monthly => {
            let day = config.day.max(1);
            let this_month = clamped_date(now.year(), now.month(), day)
                .and_then(|date| at_time(date, config.hour, config.minute));
            if let Some(candidate) = this_month {
                if candidate > now {
                    return Some(candidate);
                }
            }
            let (year, month) = if now.month() == 12 {
                (now.year() + 1, 1)
            } else {
                (now.year(), now.month() + 1)
            };
            clamped_date(year, month, day).and_then(|date| at_time(date, config.hour, config.minute))
        }
    }
}

fn at_time(date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Local>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Local.from_local_datetime(&naive).earliest()
}

fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|date| date.pred_opt())
        .map(|date| date.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .expect("unambiguous local time")
    }

    fn config() -> ScheduleConfig {
        ScheduleConfig::default()
    }

    #[test]
    fn daily_created_after_the_slot_runs_tomorrow() {
        // Schedule for 02:00 created at 10:00 the same day.
        let now = local(2025, 3, 10, 10, 0);
        let cfg = ScheduleConfig {
            hour: 2,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Daily, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 3, 11, 2, 0));
    }

    #[test]
    fn daily_created_before_the_slot_runs_today() {
        let now = local(2025, 3, 10, 1, 0);
        let cfg = ScheduleConfig {
            hour: 2,
            minute: 30,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Daily, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 3, 10, 2, 30));
    }

    #[test]
    fn weekly_wraps_to_next_week() {
        // 2025-03-10 is a Monday; a Monday-only schedule at 02:00 checked
        // at 10:00 has to wait a full week.
        let now = local(2025, 3, 10, 10, 0);
        let cfg = ScheduleConfig {
            days: vec![0],
            hour: 2,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Weekly, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 3, 17, 2, 0));
    }

    #[test]
    fn weekly_picks_the_next_configured_day() {
        let now = local(2025, 3, 10, 10, 0); // Monday
        let cfg = ScheduleConfig {
            days: vec![2, 4], // Wednesday, Friday
            hour: 9,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Weekly, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 3, 12, 9, 0));
    }

    #[test]
    fn weekly_same_day_later_time_fires_today() {
        let now = local(2025, 3, 10, 10, 0); // Monday
        let cfg = ScheduleConfig {
            days: vec![0],
            hour: 11,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Weekly, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 3, 10, 11, 0));
    }

    #[test]
    fn monthly_clamps_to_month_length() {
        let now = local(2025, 1, 31, 12, 0);
        let cfg = ScheduleConfig {
            day: 31,
            hour: 0,
            ..config()
        };
        // January 31 00:00 is already past, so February's clamped day.
        let next = compute_next_run(ScheduleType::Monthly, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 2, 28, 0, 0));
    }

    #[test]
    fn monthly_in_the_future_this_month() {
        let now = local(2025, 1, 10, 12, 0);
        let cfg = ScheduleConfig {
            day: 15,
            hour: 8,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Monthly, &cfg, None, now).unwrap();
        assert_eq!(next, local(2025, 1, 15, 8, 0));
    }

    #[test]
    fn monthly_december_rolls_into_january() {
        let now = local(2025, 12, 20, 12, 0);
        let cfg = ScheduleConfig {
            day: 5,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Monthly, &cfg, None, now).unwrap();
        assert_eq!(next, local(2026, 1, 5, 0, 0));
    }

    #[test]
    fn interval_first_run_honors_initial_delay() {
        let now = local(2025, 3, 10, 10, 0);
        let cfg = ScheduleConfig {
            interval_minutes: Some(15),
            initial_delay_minutes: 5,
            ..config()
        };
        let next = compute_next_run(ScheduleType::Interval, &cfg, None, now).unwrap();
        assert_eq!(next, now + Duration::minutes(5));
    }

    #[test]
    fn interval_follows_last_run() {
        let now = local(2025, 3, 10, 10, 0);
        let last = local(2025, 3, 10, 9, 50);
        let cfg = ScheduleConfig {
            interval_minutes: Some(15),
            ..config()
        };
        let next = compute_next_run(ScheduleType::Interval, &cfg, Some(last), now).unwrap();
        assert_eq!(next, local(2025, 3, 10, 10, 5));
    }

    #[test]
    fn one_time_in_the_past_is_a_no_op() {
        let now = local(2025, 3, 10, 10, 0);
        let cfg = ScheduleConfig {
            run_time: Some(local(2025, 3, 9, 10, 0)),
            ..config()
        };
        assert_eq!(compute_next_run(ScheduleType::OneTime, &cfg, None, now), None);

        let cfg = ScheduleConfig {
            run_time: Some(local(2025, 3, 11, 10, 0)),
            ..config()
        };
        assert!(compute_next_run(ScheduleType::OneTime, &cfg, None, now).is_some());
    }

    #[test]
    fn next_run_after_fire_is_strictly_after_last_run() {
        let cases = [
            (
                ScheduleType::Interval,
                ScheduleConfig {
                    interval_minutes: Some(1),
                    ..config()
                },
            ),
            (
                ScheduleType::Daily,
                ScheduleConfig {
                    hour: 2,
                    ..config()
                },
            ),
            (
                ScheduleType::Weekly,
                ScheduleConfig {
                    days: vec![0, 3, 5],
                    hour: 2,
                    ..config()
                },
            ),
            (
                ScheduleType::Monthly,
                ScheduleConfig {
                    day: 15,
                    ..config()
                },
            ),
        ];

        let now = local(2025, 3, 10, 10, 0);
        for (schedule_type, cfg) in cases {
            let next = compute_next_run(schedule_type, &cfg, Some(now), now)
                .unwrap_or_else(|| panic!("{schedule_type:?} produced no next run"));
            assert!(
                next > now,
                "{schedule_type:?}: next run {next} not after last run {now}"
            );
        }
    }
}
