/// Formats a number with thousands separators, e.g. 12345 => "12,345".
pub fn format_number(num: u64) -> String {
    if num < 1000 {
        return num.to_string();
    }

    let mut parts = Vec::new();
    let mut rest = num;
    while rest > 0 {
        parts.push(rest % 1000);
        rest /= 1000;
    }

    let mut formatted = parts.last().map(u64::to_string).unwrap_or_default();
    for part in parts.iter().rev().skip(1) {
        formatted.push_str(&format!(",{part:03}"));
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_thousands_separators() {
        for (input, want) in [
            (0, "0"),
            (1, "1"),
            (12, "12"),
            (123, "123"),
            (1234, "1,234"),
            (12345, "12,345"),
            (123456, "123,456"),
            (1234567, "1,234,567"),
            (1234567890, "1,234,567,890"),
        ] {
            assert_eq!(format_number(input), want, "format_number({input})");
        }
    }
}
