//! String formatting utilities.
//!
//! Helpers for rendering identifiers and durations in log lines and
//! operator-facing output.

/// Truncates an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer identifiers.
/// Works on character boundaries so non-ASCII ids never split a code point.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((cut, _)) => format!("{}..", &id[..cut]),
		None => id.to_string(),
	}
}

/// Formats an estimated duration given in minutes, e.g. `90` -> `"1h 30m"`.
pub fn format_duration_minutes(minutes: u32) -> String {
	let hours = minutes / 60;
	let rest = minutes % 60;
	match (hours, rest) {
		(0, m) => format!("{}m", m),
		(h, 0) => format!("{}h", h),
		(h, m) => format!("{}h {}m", h, m),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("ord-1"), "ord-1");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
		assert_eq!(truncate_id("ñññññññññ"), "ññññññññ..");
	}

	#[test]
	fn test_format_duration_minutes() {
		assert_eq!(format_duration_minutes(15), "15m");
		assert_eq!(format_duration_minutes(120), "2h");
		assert_eq!(format_duration_minutes(90), "1h 30m");
	}
}
