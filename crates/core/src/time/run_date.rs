use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};

/// The calendar date a run is recorded under.
///
/// An explicit `YYYY-MM-DD` argument wins. Otherwise the date of `now_utc` in `offset`, or in the
/// host's local zone when no offset is configured.
pub fn resolve_run_date(
    run_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    offset: Option<FixedOffset>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = run_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid --run-date {s:?}, expected YYYY-MM-DD"));
    }

    Ok(clock_date(now_utc, offset))
}

/// Today's date in `offset`, or in the host's local zone. Snapshots are stamped with this,
/// whatever date the run itself is recorded under.
pub fn clock_date(now_utc: DateTime<Utc>, offset: Option<FixedOffset>) -> NaiveDate {
    match offset {
        Some(tz) => now_utc.with_timezone(&tz).date_naive(),
        None => now_utc.with_timezone(&Local).date_naive(),
    }
}
