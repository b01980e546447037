// Resolver - one batched registry lookup per annotation call
//
// Turns registry rows into resolutions ready to be written onto records.
// Tag blobs are decoded here, before anything in the batch is touched.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::registry::{AccountRegistry, LookupContext, ProgramAccount};
use crate::transaction::Purpose;

/// Account identity for one control program
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub control_program: Vec<u8>,
    pub account_id: String,
    pub alias: Option<String>,
    pub tags: Option<Value>,
    pub purpose: Purpose,
}

impl Resolution {
    pub fn from_row(row: ProgramAccount) -> Result<Self, RegistryError> {
        let tags = match row.tags.as_deref() {
            None | Some([]) => None,
            Some(blob) => Some(serde_json::from_slice(blob).map_err(|source| {
                RegistryError::CorruptTags {
                    account_id: row.account_id.clone(),
                    source,
                }
            })?),
        };

        Ok(Resolution {
            purpose: Purpose::from_change_flag(row.is_change),
            control_program: row.control_program,
            account_id: row.account_id,
            alias: row.alias,
            tags,
        })
    }
}

/// Resolve the distinct key set with a single registry call
///
/// An empty key set still goes through the registry, which answers with no
/// rows. Any failure is returned as-is; there is no partial result.
pub fn resolve<R>(
    registry: &R,
    ctx: &LookupContext,
    programs: &[Vec<u8>],
) -> Result<Vec<Resolution>, RegistryError>
where
    R: AccountRegistry + ?Sized,
{
    ctx.check()?;

    let rows = registry.resolve(programs, ctx).map_err(|e| {
        warn!(keys = programs.len(), error = %e, "account registry lookup failed");
        e
    })?;

    debug!(keys = programs.len(), matched = rows.len(), "resolved control programs");

    rows.into_iter().map(Resolution::from_row).collect()
}
