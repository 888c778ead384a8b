use crate::error::{BotResult, Error};
use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current instant, injectable so the scheduler can be
/// driven deterministically in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Date formats accepted from user input. The wizard historically asked
/// for dd/mm/yyyy; ISO dates are accepted as well.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d.%m.%Y"];

/// Time formats accepted from user input
const TIME_FORMATS: &[&str] = &["%H:%M", "%H:%M:%S"];

/// Turns raw (date, time) text into an absolute instant in a fixed
/// timezone. The accepted grammar lives entirely behind this type; the
/// scheduling core only ever sees the resolved UTC instant.
#[derive(Debug, Clone, Copy)]
pub struct DateTimeResolver {
    tz: Tz,
}

impl DateTimeResolver {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Resolve `date_text` and `time_text` into a UTC instant strictly
    /// after `now`. Fails with `InvalidDateTime` when nothing parses (or
    /// the local time does not exist in the zone) and `DateInPast` when
    /// the instant has already passed.
    pub fn resolve(
        &self,
        date_text: &str,
        time_text: &str,
        now: DateTime<Utc>,
    ) -> BotResult<DateTime<Utc>> {
        let date = parse_date(date_text.trim())
            .ok_or_else(|| Error::InvalidDateTime(date_text.to_string()))?;
        let time = parse_time(time_text.trim())
            .ok_or_else(|| Error::InvalidDateTime(time_text.to_string()))?;

        let local = date.and_time(time);
        let resolved = match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt,
            // DST fold: take the earlier of the two wall-clock instants
            LocalResult::Ambiguous(earlier, _) => earlier,
            LocalResult::None => {
                return Err(Error::InvalidDateTime(format!(
                    "{} {} does not exist in {}",
                    date_text, time_text, self.tz
                )))
            }
        };

        let resolved = resolved.with_timezone(&Utc);
        if resolved <= now {
            return Err(Error::DateInPast);
        }

        Ok(resolved)
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

/// Render an event start time for display, in the configured timezone.
/// Stored on the event at creation so listings never re-derive formatting.
pub fn format_event_time(start: DateTime<Utc>, tz: Tz) -> String {
    start
        .with_timezone(&tz)
        .format("%Y-%m-%d | %H:%M | %z")
        .to_string()
}
