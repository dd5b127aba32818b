use std::time::Duration;

pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_pct(part: u64, total: u64) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", (part as f64) * 100.0 / (total as f64))
}

/// Latency-style rendering: `850us`, `12.34ms`, `1.50s`.
pub(crate) fn format_latency(d: Duration) -> String {
    let us = d.as_micros();
    if us < 1_000 {
        return format!("{us}us");
    }
    if us < 1_000_000 {
        return format!("{:.2}ms", (us as f64) / 1_000.0);
    }
    format!("{:.2}s", d.as_secs_f64())
}

/// Wall-clock rendering for progress lines, rounded to whole seconds: `1m05s`, `42s`.
pub(crate) fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64().round() as u64;
    if secs >= 60 {
        return format!("{}m{:02}s", secs / 60, secs % 60);
    }
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MiB");
    }

    #[test]
    fn latency_picks_a_readable_unit() {
        assert_eq!(format_latency(Duration::from_micros(850)), "850us");
        assert_eq!(format_latency(Duration::from_micros(12_340)), "12.34ms");
        assert_eq!(format_latency(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn elapsed_and_pct() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m05s");
        assert_eq!(format_pct(1, 4), "25.00%");
        assert_eq!(format_pct(0, 0), "0.00%");
    }
}
