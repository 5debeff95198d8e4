//! Decoding helpers shared by the CLI response schemas.

use serde::{Deserialize, Deserializer};

/// Reads an explicit `null` as the field's default, the same as a missing key.
///
/// Type mismatches are still errors: `"count": "many"` does not silently become zero.
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
