//! JSON serialization for combination results.

use serde::Serialize;

/// Serialize a result to a compact JSON string.
///
/// Works for [`BlueResult`](crate::BlueResult),
/// [`MultiBlueResult`](crate::MultiBlueResult) and
/// [`CorrelationDecomposition`](crate::statistics::CorrelationDecomposition).
///
/// # Errors
///
/// Returns an error if serialization fails (non-finite numbers are written
/// as `null` and do not fail).
pub fn to_json<T: Serialize>(result: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(result)
}

/// Serialize a result to a pretty-printed JSON string.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json_pretty<T: Serialize>(result: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}
