use std::fmt;

use chrono::{DateTime, TimeZone};

use crate::colors::variant_color;
use crate::marker::{MarkerDescriptor, MarkerVariant};
use crate::time_format::format_marker_time;

pub const FALLBACK_TITLE: &str = "Location";

pub fn badge_label(variant: MarkerVariant) -> &'static str {
    match variant {
        MarkerVariant::Current => "Current",
        MarkerVariant::Home => "Home",
        MarkerVariant::Checkin => "Check-in",
        MarkerVariant::Checkout => "Checkout",
        MarkerVariant::Visit => "Scheduled Visit",
        MarkerVariant::Store => "Store",
        MarkerVariant::Unknown => "Marker",
    }
}

/// Build the info-popup HTML for one marker. `now` fixes both the reference
/// day for "Today"/"Yesterday" and the display timezone.
pub fn render_popup<Tz>(marker: &MarkerDescriptor, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut html = String::with_capacity(256);
    html.push_str(r#"<div class="fm-popup">"#);

    let title = marker
        .label
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(FALLBACK_TITLE);
    html.push_str(r#"<div class="fm-popup-title">"#);
    push_escaped(&mut html, title);
    html.push_str("</div>");

    if let Some(variant) = marker.variant {
        html.push_str(&format!(
            r#"<span class="fm-popup-badge fm-popup-badge-{}" style="background:{};">{}</span>"#,
            variant.as_str(),
            variant_color(Some(variant)),
            badge_label(variant)
        ));
    }

    if let Some(ts) = marker.timestamp.as_ref() {
        html.push_str(r#"<div class="fm-popup-time">"#);
        push_escaped(&mut html, &format_marker_time(ts, now));
        html.push_str("</div>");
    }

    let lines = marker
        .subtitle
        .iter()
        .chain(marker.description.iter())
        .flat_map(|text| text.lines())
        .filter(|line| !line.trim().is_empty());
    for line in lines {
        html.push_str(r#"<div class="fm-popup-line">"#);
        push_escaped(&mut html, line);
        html.push_str("</div>");
    }

    html.push_str("</div>");
    html
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
