use crate::marker::MarkerVariant;

/// Neutral gray used when a marker has no recognizable variant.
pub const DEFAULT_MARKER_COLOR: &str = "#6b7280";

/// Canonical tint for each marker variant.
pub fn variant_color(variant: Option<MarkerVariant>) -> &'static str {
    match variant {
        Some(MarkerVariant::Current) => "#2563eb",
        Some(MarkerVariant::Home) => "#16a34a",
        Some(MarkerVariant::Checkin) => "#0d9488",
        Some(MarkerVariant::Checkout) => "#dc2626",
        Some(MarkerVariant::Visit) => "#d97706",
        Some(MarkerVariant::Store) => "#7c3aed",
        Some(MarkerVariant::Unknown) | None => DEFAULT_MARKER_COLOR,
    }
}

/// Deterministic per-entity hue via CRC32 of the entity key, so every tracked
/// employee keeps the same color across refreshes.
pub fn entity_color(key: &str) -> String {
    let hash = crc32fast::hash(key.as_bytes());
    let hue = (hash % 360) as f64;
    let (r, g, b) = hsl_to_rgb(hue, 0.68, 0.44);
    hex(r, g, b)
}

pub fn hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Parse `#rgb` or `#rrggbb`.
pub fn parse_hex(value: &str) -> Option<(u8, u8, u8)> {
    let digits = value.strip_prefix('#')?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        3 => {
            let mut it = digits.chars().filter_map(|c| c.to_digit(16)).map(|d| (d * 17) as u8);
            Some((it.next()?, it.next()?, it.next()?))
        }
        6 => Some((
            u8::from_str_radix(&digits[0..2], 16).ok()?,
            u8::from_str_radix(&digits[2..4], 16).ok()?,
            u8::from_str_radix(&digits[4..6], 16).ok()?,
        )),
        _ => None,
    }
}

/// Accept only color syntax that is safe to splice into SVG/HTML attributes:
/// hex, bare named colors, and `rgb()/rgba()/hsl()/hsla()` with numeric args.
pub fn sanitize_color(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.len() > 48 {
        return None;
    }
    if value.starts_with('#') {
        return parse_hex(value).map(|_| value.to_ascii_lowercase());
    }
    if value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(value.to_ascii_lowercase());
    }
    let lower = value.to_ascii_lowercase();
    let args = ["rgb(", "rgba(", "hsl(", "hsla("]
        .iter()
        .find_map(|prefix| lower.strip_prefix(prefix))?
        .strip_suffix(')')?;
    let args_ok = args
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '%' | ' ' | '-' | '/'));
    args_ok.then_some(lower)
}

/// Darken a hex color for marker outlines. Non-hex input falls back to a
/// fixed dark stroke.
pub fn outline_for(color: &str) -> String {
    let Some((r, g, b)) = parse_hex(color) else {
        return "#1f2937".to_owned();
    };
    let (h, s, l) = rgb_to_hsl(r, g, b);
    let (r, g, b) = hsl_to_rgb(h, s, (l * 0.7).clamp(0.0, 1.0));
    hex(r, g, b)
}

/// Convert RGB to HSL. Returns (h: 0..360, s: 0..1, l: 0..1).
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };

    let h = if (max - r).abs() < f64::EPSILON {
        let mut h = (g - b) / d;
        if g < b {
            h += 6.0;
        }
        h
    } else if (max - g).abs() < f64::EPSILON {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    (h * 60.0, s, l)
}

/// Convert HSL to RGB.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    if s.abs() < f64::EPSILON {
        let v = (l * 255.0).round() as u8;
        return (v, v, v);
    }

    let q = if l < 0.5 {
        l * (1.0 + s)
    } else {
        l + s - l * s
    };
    let p = 2.0 * l - q;
    let h = h / 360.0;

    (
        (hue_to_rgb(p, q, h + 1.0 / 3.0) * 255.0).round() as u8,
        (hue_to_rgb(p, q, h) * 255.0).round() as u8,
        (hue_to_rgb(p, q, h - 1.0 / 3.0) * 255.0).round() as u8,
    )
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}
