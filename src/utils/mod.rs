// Thu Feb 5 2026 - Alex

pub mod logging;

pub use logging::ScopedTimer;

use std::time::Duration;

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();

    if total_secs < 0.001 {
        format!("{:.2}µs", duration.as_micros())
    } else if total_secs < 1.0 {
        format!("{:.2}ms", duration.as_millis())
    } else {
        format!("{:.2}s", total_secs)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_picks_unit() {
        assert_eq!(format_bytes(100), "100 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "node", "nodes"), "1 node");
        assert_eq!(pluralize(5, "node", "nodes"), "5 nodes");
    }
}
