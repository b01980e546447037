// 📥 Registry import - CSV → SQLite registry
//
// CSV columns: account_id,alias,tags,control_program,change
// - account_id may be empty: the account is then found by alias, or created
// - tags is a JSON object (or empty)
// - control_program is hex

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::registry::SqliteRegistry;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryCsvRow {
    pub account_id: Option<String>,
    pub alias: Option<String>,
    pub tags: Option<String>,
    pub control_program: String,
    #[serde(default)]
    pub change: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub rows: usize,
    pub accounts_created: usize,
    pub programs_inserted: usize,
    pub programs_skipped: usize,
}

pub fn load_registry_csv(csv_path: &Path) -> Result<Vec<RegistryCsvRow>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: RegistryCsvRow = result.context("Failed to deserialize registry row")?;
        rows.push(row);
    }

    Ok(rows)
}

/// Write CSV rows into the registry; already-known programs are skipped
pub fn import_rows(registry: &SqliteRegistry, rows: &[RegistryCsvRow]) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for (line, row) in rows.iter().enumerate() {
        stats.rows += 1;

        let program = hex::decode(row.control_program.trim())
            .with_context(|| format!("Row {}: control_program is not hex", line + 1))?;

        let tags = match row.tags.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(tags) => {
                serde_json::from_str::<serde_json::Value>(tags)
                    .with_context(|| format!("Row {}: tags are not valid JSON", line + 1))?;
                Some(tags.as_bytes())
            }
        };
        let alias = row.alias.as_deref().filter(|a| !a.is_empty());

        let account_id = match (row.account_id.as_deref().filter(|id| !id.is_empty()), alias) {
            (Some(id), _) => {
                registry.upsert_account(id, alias, tags)?;
                id.to_string()
            }
            (None, Some(alias)) => match registry.account_id_for_alias(alias)? {
                Some(id) => id,
                None => {
                    stats.accounts_created += 1;
                    registry.create_account(Some(alias), tags)?
                }
            },
            (None, None) => bail!("Row {}: needs an account_id or an alias", line + 1),
        };

        if registry.add_control_program(&account_id, &program, row.change)? {
            stats.programs_inserted += 1;
        } else {
            stats.programs_skipped += 1;
        }
    }

    info!(
        rows = stats.rows,
        accounts_created = stats.accounts_created,
        inserted = stats.programs_inserted,
        skipped = stats.programs_skipped,
        "imported registry rows"
    );

    Ok(stats)
}
