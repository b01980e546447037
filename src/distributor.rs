// Distributor - fan resolved accounts back out to records
//
// For every resolution: set the account identity on each record indexed
// under its control program, then set `purpose` on each output. Records
// whose program did not resolve are left exactly as they were.

use crate::collector::{Collection, RecordRef};
use crate::error::Side;
use crate::resolver::Resolution;
use crate::transaction::Transaction;

/// What a distribution pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub transactions: usize,
    pub programs: usize,
    pub programs_resolved: usize,
    pub records_annotated: usize,
    pub outputs_labelled: usize,
}

impl AnnotationSummary {
    /// Distinct programs the registry knew nothing about
    pub fn programs_unknown(&self) -> usize {
        self.programs.saturating_sub(self.programs_resolved)
    }
}

/// Write resolutions onto the batch
pub fn distribute(
    transactions: &mut [Transaction],
    collection: &Collection,
    resolutions: &[Resolution],
) -> AnnotationSummary {
    let mut summary = AnnotationSummary {
        transactions: transactions.len(),
        programs: collection.programs.len(),
        ..Default::default()
    };

    for resolution in resolutions {
        let mut matched = false;

        if let Some(records) = collection.identity_targets.get(&resolution.control_program) {
            for record in records {
                if set_identity(transactions, *record, resolution) {
                    summary.records_annotated += 1;
                    matched = true;
                }
            }
        }

        if let Some(outputs) = collection.purpose_targets.get(&resolution.control_program) {
            for record in outputs {
                if set_purpose(transactions, *record, resolution) {
                    summary.outputs_labelled += 1;
                }
            }
        }

        if matched {
            summary.programs_resolved += 1;
        }
    }

    summary
}

fn set_identity(transactions: &mut [Transaction], record: RecordRef, resolution: &Resolution) -> bool {
    let Some(tx) = transactions.get_mut(record.tx) else {
        return false;
    };

    let (account_id, account_alias, account_tags, extra) = match record.side {
        Side::Input => match tx.inputs.get_mut(record.index) {
            Some(input) => (
                &mut input.account_id,
                &mut input.account_alias,
                &mut input.account_tags,
                &mut input.extra,
            ),
            None => return false,
        },
        Side::Output => match tx.outputs.get_mut(record.index) {
            Some(output) => (
                &mut output.account_id,
                &mut output.account_alias,
                &mut output.account_tags,
                &mut output.extra,
            ),
            None => return false,
        },
    };

    // A foreign value parked in `extra` would otherwise serialize next to ours
    extra.remove("account_id");
    *account_id = Some(resolution.account_id.clone());
    if let Some(tags) = &resolution.tags {
        *account_tags = Some(tags.clone());
    }
    if let Some(alias) = &resolution.alias {
        extra.remove("account_alias");
        *account_alias = Some(alias.clone());
    }
    true
}

fn set_purpose(transactions: &mut [Transaction], record: RecordRef, resolution: &Resolution) -> bool {
    if record.side != Side::Output {
        return false;
    }
    match transactions
        .get_mut(record.tx)
        .and_then(|tx| tx.outputs.get_mut(record.index))
    {
        Some(output) => {
            output.extra.remove("purpose");
            output.purpose = Some(resolution.purpose);
            true
        }
        None => false,
    }
}
