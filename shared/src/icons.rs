use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::colors::{outline_for, sanitize_color, variant_color};
use crate::marker::{MarkerDescriptor, MarkerVariant};

pub const ICON_WIDTH: u32 = 30;
pub const ICON_HEIGHT: u32 = 42;
pub const DEFAULT_ICON_CACHE_CAPACITY: usize = 256;

const TEARDROP_PATH: &str = "M15 1C7.27 1 1 7.1 1 14.62 1 24.84 15 41 15 41s14-16.16 14-26.38C29 7.1 22.73 1 15 1z";
const HOUSE_PATH: &str = "M15 9.2l-5 4.3v5.3h3.4v-3.3h3.2v3.3H20v-5.3z";

/// Cache key for one rendered icon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IconKey {
    pub variant: Option<MarkerVariant>,
    pub color: String,
    pub ordinal: Option<u32>,
}

impl IconKey {
    pub fn new(variant: Option<MarkerVariant>, color: Option<&str>, ordinal: Option<u32>) -> Self {
        let color = color
            .and_then(sanitize_color)
            .unwrap_or_else(|| variant_color(variant).to_owned());
        Self {
            variant,
            color,
            ordinal: ordinal.filter(|n| *n > 0),
        }
    }

    /// Pick the icon a descriptor should render with:
    /// numbered trail stop, entity-tinted live/home pin, or the plain variant pin.
    pub fn for_marker(marker: &MarkerDescriptor) -> Self {
        let override_color = marker.color_override.as_deref();
        if let Some(ordinal) = marker.effective_ordinal() {
            return Self::new(marker.variant, override_color, Some(ordinal));
        }
        match marker.variant {
            Some(MarkerVariant::Current | MarkerVariant::Home) if override_color.is_some() => {
                Self::new(marker.variant, override_color, None)
            }
            variant => Self::new(variant, None, None),
        }
    }

    /// `variant|color|ordinal`
    pub fn cache_key(&self) -> String {
        let variant = self.variant.map(MarkerVariant::as_str).unwrap_or("default");
        let ordinal = self.ordinal.map(|n| n.to_string()).unwrap_or_default();
        format!("{variant}|{}|{ordinal}", self.color)
    }
}

/// Renderable icon: an SVG data URI plus Leaflet-style sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconSpec {
    pub key: String,
    pub url: String,
    pub size: (u32, u32),
    pub anchor: (u32, u32),
    pub popup_anchor: (i32, i32),
}

/// Bounded icon cache. Identical `(variant, color, ordinal)` requests return
/// the same `Rc`, so a sync pass over thousands of markers generates each
/// distinct SVG once.
pub struct IconFactory {
    cache: HashMap<IconKey, Rc<IconSpec>>,
    order: VecDeque<IconKey>,
    capacity: usize,
}

impl Default for IconFactory {
    fn default() -> Self {
        Self::new(DEFAULT_ICON_CACHE_CAPACITY)
    }
}

impl IconFactory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn make_icon(
        &mut self,
        variant: Option<MarkerVariant>,
        color: Option<&str>,
        ordinal: Option<u32>,
    ) -> Rc<IconSpec> {
        self.get(IconKey::new(variant, color, ordinal))
    }

    pub fn icon_for(&mut self, marker: &MarkerDescriptor) -> Rc<IconSpec> {
        self.get(IconKey::for_marker(marker))
    }

    pub fn get(&mut self, key: IconKey) -> Rc<IconSpec> {
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let spec = Rc::new(IconSpec {
            key: key.cache_key(),
            url: svg_data_uri(&render_icon_svg(&key)),
            size: (ICON_WIDTH, ICON_HEIGHT),
            anchor: (ICON_WIDTH / 2, ICON_HEIGHT),
            popup_anchor: (0, -(ICON_HEIGHT as i32) + 6),
        });

        if self.cache.len() >= self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.cache.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.cache.insert(key, spec.clone());
        spec
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

pub fn render_icon_svg(key: &IconKey) -> String {
    let fill = &key.color;
    let stroke = outline_for(fill);
    let inset = match (key.ordinal, key.variant) {
        (Some(n), _) => {
            let label = n.to_string();
            let font_size = match label.len() {
                1 => 11,
                2 => 9,
                _ => 7,
            };
            format!(
                r##"<circle cx="15" cy="14.5" r="8" fill="#ffffff"/><text x="15" y="14.5" text-anchor="middle" dominant-baseline="central" font-family="Arial,Helvetica,sans-serif" font-weight="700" font-size="{font_size}" fill="{fill}">{label}</text>"##
            )
        }
        (None, Some(MarkerVariant::Home)) => format!(
            r##"<circle cx="15" cy="14.5" r="8" fill="#ffffff"/><path d="{HOUSE_PATH}" fill="{fill}"/>"##
        ),
        (None, _) => r##"<circle cx="15" cy="14.5" r="5.5" fill="#ffffff"/>"##.to_owned(),
    };
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{ICON_WIDTH}" height="{ICON_HEIGHT}" viewBox="0 0 {ICON_WIDTH} {ICON_HEIGHT}"><path d="{TEARDROP_PATH}" fill="{fill}" stroke="{stroke}" stroke-width="1.5"/>{inset}</svg>"#
    )
}

fn svg_data_uri(svg: &str) -> String {
    format!(
        "data:image/svg+xml;charset=UTF-8,{}",
        utf8_percent_encode(svg, NON_ALPHANUMERIC)
    )
}
