use std::fmt;

use chrono::{DateTime, Days, TimeZone, Utc};

/// Popup timestamp in the viewer's timezone (the timezone of `now`):
/// "Today 14:05", "Yesterday 09:12", otherwise "3 Mar '25 18:40".
pub fn format_marker_time<Tz>(timestamp: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let local = timestamp.with_timezone(&now.timezone());
    let day = local.date_naive();
    let today = now.date_naive();

    let time = local.format("%H:%M");
    if day == today {
        format!("Today {time}")
    } else if today.checked_sub_days(Days::new(1)) == Some(day) {
        format!("Yesterday {time}")
    } else {
        local.format("%-d %b '%y %H:%M").to_string()
    }
}
