//! Byte-count reporting: human-readable sizes and reduction percentages.

const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Renders a byte count with the largest unit whose scaled value is >= 1,
/// rounded to two decimals with trailing zeros dropped ("1 KB", "1.5 MB").
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    // floor(log1024(bytes)) without float boundary trouble at exact powers.
    let unit = ((63 - bytes.leading_zeros() as usize) / 10).min(UNITS.len() - 1);
    let scaled = bytes as f64 / 1024f64.powi(unit as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Percentage reduction with one fractional digit, e.g. "75.0". `None` when
/// `original` is zero; a grown output yields a negative percentage.
pub fn reduction_percent(original: u64, compressed: u64) -> Option<String> {
    if original == 0 {
        return None;
    }
    let percent = (original as f64 - compressed as f64) / original as f64 * 100.0;
    Some(format!("{:.1}", percent))
}

/// Before/after byte counts for one compression, derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMetrics {
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl SizeMetrics {
    pub fn new(original_bytes: u64, compressed_bytes: u64) -> Self {
        Self {
            original_bytes,
            compressed_bytes,
        }
    }

    pub fn original_size(&self) -> String {
        format_size(self.original_bytes)
    }

    pub fn compressed_size(&self) -> String {
        format_size(self.compressed_bytes)
    }

    pub fn reduction_percent(&self) -> Option<String> {
        reduction_percent(self.original_bytes, self.compressed_bytes)
    }
}
