/// Colors handed out to authors, as hex without the leading `#`.
pub const AUTHOR_PALETTE: [&str; 8] = [
  "3b82f6", "10b981", "f59e0b", "ef4444", "8b5cf6", "ec4899", "06b6d4", "f97316",
];

/// Fallback color for label buckets whose label is not in the catalog.
pub const DEFAULT_LABEL_COLOR: &str = "6b7280";

/// Pick a palette color for `value`. The same string always maps to the
/// same color.
///
/// Only the shifted operand is truncated to 32 bits; the running hash keeps
/// its full width, so this stays compatible with colors assigned in browsers.
pub fn string_to_color(value: &str) -> &'static str {
  let hash = value.encode_utf16().fold(0i64, |hash, unit| {
    i64::from(unit) + i64::from((hash as i32).wrapping_shl(5)) - hash
  });
  AUTHOR_PALETTE[(hash.unsigned_abs() % AUTHOR_PALETTE.len() as u64) as usize]
}
