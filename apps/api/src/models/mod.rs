pub mod analysis;
pub mod cover_letter;
pub mod profile;
pub mod resume;
pub mod run;

use serde::{Deserialize, Deserializer};

/// Reads an explicit JSON `null` the same way as an absent field.
/// Pair with `#[serde(default)]`; LLM output often uses `null` for unknown values.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
