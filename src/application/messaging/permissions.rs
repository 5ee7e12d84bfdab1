//! Permission resolution for command checks

use crate::application::errors::CommandError;
use crate::domain::entities::{Interaction, PermissionCheck};

/// Flag that satisfies every requirement
pub const ADMINISTRATOR: &str = "ADMINISTRATOR";

/// Returns the permissions `check` finds missing, or `None`.
///
/// Flag checks only apply inside a guild and only when the platform resolved
/// the held permissions; `held` is that resolved list. An empty list from a
/// custom resolver counts as nothing missing.
pub async fn missing_permissions(
    check: &PermissionCheck,
    held: Option<&[String]>,
    interaction: &Interaction,
) -> Result<Option<Vec<String>>, CommandError> {
    let missing = match check {
        PermissionCheck::Flags(required) => {
            if !interaction.is_guild() {
                return Ok(None);
            }
            let Some(held) = held else {
                return Ok(None);
            };
            if held.iter().any(|p| p == ADMINISTRATOR) {
                return Ok(None);
            }
            Some(
                required
                    .iter()
                    .filter(|flag| !held.contains(flag))
                    .cloned()
                    .collect(),
            )
        }
        PermissionCheck::Custom(resolver) => resolver.missing(interaction).await?,
    };
    Ok(missing.filter(|m: &Vec<String>| !m.is_empty()))
}
