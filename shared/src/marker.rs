use std::collections::HashSet;
use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the WGS84 lat/lng range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Stable marker key. Feeds send either numeric or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkerId {
    Num(i64),
    Text(String),
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerId::Num(n) => write!(f, "{n}"),
            MarkerId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MarkerId {
    fn from(value: i64) -> Self {
        MarkerId::Num(value)
    }
}

impl From<&str> for MarkerId {
    fn from(value: &str) -> Self {
        MarkerId::Text(value.to_owned())
    }
}

impl From<String> for MarkerId {
    fn from(value: String) -> Self {
        MarkerId::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MarkerVariant {
    Current,
    Home,
    Checkin,
    Checkout,
    Visit,
    Store,
    /// Anything the feed sends that we don't recognize.
    Unknown,
}

impl MarkerVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkerVariant::Current => "current",
            MarkerVariant::Home => "home",
            MarkerVariant::Checkin => "checkin",
            MarkerVariant::Checkout => "checkout",
            MarkerVariant::Visit => "visit",
            MarkerVariant::Store => "store",
            MarkerVariant::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "current" => MarkerVariant::Current,
            "home" => MarkerVariant::Home,
            "checkin" | "check-in" => MarkerVariant::Checkin,
            "checkout" | "check-out" => MarkerVariant::Checkout,
            "visit" => MarkerVariant::Visit,
            "store" => MarkerVariant::Store,
            _ => MarkerVariant::Unknown,
        }
    }
}

impl From<String> for MarkerVariant {
    fn from(value: String) -> Self {
        MarkerVariant::parse(&value)
    }
}

impl From<MarkerVariant> for String {
    fn from(value: MarkerVariant) -> Self {
        value.as_str().to_owned()
    }
}

/// One plotted point on the live map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDescriptor {
    pub id: MarkerId,
    pub position: LatLng,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<MarkerVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_override: Option<String>,
}

impl MarkerDescriptor {
    pub fn new(id: impl Into<MarkerId>, position: LatLng) -> Self {
        Self {
            id: id.into(),
            position,
            variant: None,
            label: None,
            subtitle: None,
            description: None,
            timestamp: None,
            ordinal: None,
            color_override: None,
        }
    }

    pub fn with_variant(mut self, variant: MarkerVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color_override = Some(color.into());
        self
    }

    /// Ordinal `0` is treated as absent.
    pub fn effective_ordinal(&self) -> Option<u32> {
        self.ordinal.filter(|n| *n > 0)
    }
}

/// Order-stable summary of a marker list: id, position, variant and ordinal
/// of every descriptor. Two lists with equal signatures render identical
/// layer sets, so the widget only rebuilds when this changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MarkerSignature(String);

impl MarkerSignature {
    pub fn of(markers: &[MarkerDescriptor]) -> Self {
        let mut out = String::with_capacity(markers.len() * 40);
        for m in markers {
            let variant = m.variant.map(MarkerVariant::as_str).unwrap_or("-");
            let ordinal = m.effective_ordinal().unwrap_or(0);
            // Ids are kind-tagged and text ids length-prefixed, so `1` and
            // `"1"` differ and no id can spell out another entry.
            let _ = match &m.id {
                MarkerId::Num(n) => write!(out, "n{n}"),
                MarkerId::Text(t) => write!(out, "s{}:{t}", t.len()),
            };
            let _ = write!(
                out,
                "@{},{}:{variant}:{ordinal};",
                m.position.lat, m.position.lng
            );
        }
        Self(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    NotAnArray,
    Json(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::NotAnArray => f.write_str("marker feed must be a JSON array"),
            FeedError::Json(e) => write!(f, "invalid marker feed JSON: {e}"),
        }
    }
}

impl std::error::Error for FeedError {}

/// A rejected feed record: its index in the input array and the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerBatch {
    pub markers: Vec<MarkerDescriptor>,
    pub skipped: Vec<SkippedRecord>,
}

/// Decode a feed leniently: malformed records are dropped and reported,
/// the rest of the batch survives.
pub fn decode_markers(value: serde_json::Value) -> Result<MarkerBatch, FeedError> {
    let serde_json::Value::Array(records) = value else {
        return Err(FeedError::NotAnArray);
    };

    let mut batch = MarkerBatch::default();
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<MarkerDescriptor>(record) {
            Ok(marker) if marker.position.is_valid() => batch.markers.push(marker),
            Ok(marker) => batch.skipped.push(SkippedRecord {
                index,
                reason: format!(
                    "marker {} has out-of-range position ({}, {})",
                    marker.id, marker.position.lat, marker.position.lng
                ),
            }),
            Err(e) => batch.skipped.push(SkippedRecord {
                index,
                reason: e.to_string(),
            }),
        }
    }
    Ok(batch)
}

pub fn decode_markers_str(raw: &str) -> Result<MarkerBatch, FeedError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| FeedError::Json(e.to_string()))?;
    decode_markers(value)
}

/// Keep the last descriptor for every id, preserving the order in which the
/// surviving entries appeared. Returns the number of dropped duplicates.
pub fn dedupe_last_wins(markers: &[MarkerDescriptor]) -> (Vec<&MarkerDescriptor>, usize) {
    let mut seen: HashSet<&MarkerId> = HashSet::with_capacity(markers.len());
    let mut kept: Vec<&MarkerDescriptor> = Vec::with_capacity(markers.len());
    for m in markers.iter().rev() {
        if seen.insert(&m.id) {
            kept.push(m);
        }
    }
    kept.reverse();
    let dropped = markers.len() - kept.len();
    (kept, dropped)
}
