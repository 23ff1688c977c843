const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
const STEP: f64 = 1024.0;

/// Renders a byte count with the largest binary unit that keeps it at or
/// above one.
pub fn pretty_size_from_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / STEP;
    let mut unit = 0;
    while value >= STEP && unit + 1 < UNITS.len() {
        value /= STEP;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::pretty_size_from_bytes;

    #[test]
    fn sizes() {
        assert_eq!(pretty_size_from_bytes(512), "512 B");
        assert_eq!(pretty_size_from_bytes(128 * 1024), "128.00 KB");
        assert_eq!(pretty_size_from_bytes(3 * 1024 * 1024 / 2), "1.50 MB");
        assert_eq!(pretty_size_from_bytes(5 << 40), "5.00 TB");
        assert_eq!(pretty_size_from_bytes(2048 << 40), "2048.00 TB");
    }
}
