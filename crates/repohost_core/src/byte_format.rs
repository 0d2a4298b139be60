//! Human-readable byte sizes.

/// Formats a byte count as `b`, `KB`, `MB` or `GB` with grouped digits.
///
/// Below one megabyte the value is shown without decimals; above it, with one.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let n = bytes as f64;
    if bytes < 1024 {
        format!("{} b", group_thousands(&bytes.to_string()))
    } else if n < MB {
        format!("{} KB", group_thousands(&format!("{:.0}", n / KB)))
    } else if n < GB {
        format!("{} MB", grouped_one_decimal(n / MB))
    } else {
        format!("{} GB", grouped_one_decimal(n / GB))
    }
}

/// Parses sizes such as `500KB`, `2m`, `1 GB` or `4096` into bytes.
///
/// Unparseable input yields `None`.
pub fn parse_size(input: &str) -> Option<u64> {
    let s = input.trim().to_lowercase();
    let digits_end = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(digits_end);
    let value: f64 = number.parse().ok()?;
    let multiplier = match unit.trim() {
        "" | "b" => 1u64,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return None,
    };
    Some((value * multiplier as f64) as u64)
}

fn grouped_one_decimal(value: f64) -> String {
    let formatted = format!("{:.1}", value);
    match formatted.split_once('.') {
        Some((whole, frac)) => format!("{}.{}", group_thousands(whole), frac),
        None => group_thousands(&formatted),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
