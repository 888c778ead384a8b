use crate::components::event_store::models::{Event, Recurrence};
use chrono::{DateTime, Duration, Months, Utc};

/// One advance-notification rule: how long before the event start the
/// reminder fires, and the text to announce with it
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReminderRule {
    pub lead_minutes: i64,
    pub message: String,
}

impl ReminderRule {
    pub fn lead(&self) -> Duration {
        Duration::minutes(self.lead_minutes)
    }
}

/// The rule set used when no `config/reminders.toml` overrides it:
/// 1 day, 1 hour and 10 minutes before the event
pub fn default_rules() -> Vec<ReminderRule> {
    vec![
        ReminderRule {
            lead_minutes: 24 * 60,
            message: "We start tomorrow, see you there!".to_string(),
        },
        ReminderRule {
            lead_minutes: 60,
            message: "Getting ready, we start in one hour!".to_string(),
        },
        ReminderRule {
            lead_minutes: 10,
            message: "Starting in 10 minutes, don't miss it!".to_string(),
        },
    ]
}

/// What becomes due at a fire instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireKind {
    /// Advance notification for the rule at this index
    Reminder(usize),
    /// The event start itself; drives one-off expiry and recurrence advance
    Occurrence,
}

/// A single pending instant for one event occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireEntry {
    pub fire_at: DateTime<Utc>,
    pub kind: FireKind,
}

/// Compute the pending fire instants for one occurrence of `event`.
///
/// Instants at or before `now` are skipped: after a restart a reminder
/// whose window was missed while the process was down is treated as
/// already fired rather than resent. The occurrence entry at
/// `start_time` is included on the same condition.
pub fn fire_instants(event: &Event, rules: &[ReminderRule], now: DateTime<Utc>) -> Vec<FireEntry> {
    let mut entries: Vec<FireEntry> = rules
        .iter()
        .enumerate()
        .filter_map(|(idx, rule)| {
            let fire_at = event.start_time - rule.lead();
            (fire_at > now).then_some(FireEntry {
                fire_at,
                kind: FireKind::Reminder(idx),
            })
        })
        .collect();

    if event.start_time > now {
        entries.push(FireEntry {
            fire_at: event.start_time,
            kind: FireKind::Occurrence,
        });
    }

    entries
}

/// Advance a recurring event's start time past `now`.
///
/// Repeats the recurrence period until the result is strictly in the
/// future, so an event that slept through several periods lands on its
/// next real occurrence instead of replaying the missed ones. Monthly
/// recurrence uses calendar months; a day-of-month that does not exist
/// in the target month clamps to its last day.
pub fn advance_to_future(
    start: DateTime<Utc>,
    recurrence: Recurrence,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut next = start;
    while next <= now {
        next = match recurrence {
            // A Once event has no next occurrence; callers never advance it
            Recurrence::Once => return next,
            Recurrence::Weekly => next + Duration::days(7),
            Recurrence::Biweekly => next + Duration::days(14),
            Recurrence::Monthly => next
                .checked_add_months(Months::new(1))
                .unwrap_or(next + Duration::days(30)),
        };
    }
    next
}
