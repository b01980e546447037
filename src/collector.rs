// Collector - gather every control program in a batch
//
// Builds two indexes keyed by decoded control-program bytes:
// - identity targets: every input and output bearing the program
// - purpose targets: outputs only
// plus the distinct key set for the registry lookup (first-seen order).
//
// Records are addressed by position, not by reference, so the batch can be
// borrowed mutably again once the lookup has returned.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{AnnotateError, AnnotateResult, Side};
use crate::transaction::{Transaction, TxInput, TxOutput};

/// Position of one record within the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub tx: usize,
    pub side: Side,
    pub index: usize,
}

/// Output of the collection pass
#[derive(Debug, Default)]
pub struct Collection {
    /// Distinct control programs, each exactly once
    pub programs: Vec<Vec<u8>>,

    /// program → all inputs and outputs carrying it
    pub identity_targets: HashMap<Vec<u8>, Vec<RecordRef>>,

    /// program → outputs carrying it
    pub purpose_targets: HashMap<Vec<u8>, Vec<RecordRef>>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Total number of records indexed for identity
    pub fn record_count(&self) -> usize {
        self.identity_targets.values().map(Vec::len).sum()
    }

    fn add_identity(&mut self, program: Vec<u8>, record: RecordRef) {
        match self.identity_targets.entry(program) {
            Entry::Occupied(mut entry) => entry.get_mut().push(record),
            Entry::Vacant(entry) => {
                self.programs.push(entry.key().clone());
                entry.insert(vec![record]);
            }
        }
    }

    fn add_purpose(&mut self, program: Vec<u8>, record: RecordRef) {
        self.purpose_targets.entry(program).or_default().push(record);
    }
}

/// Walk the batch: per transaction, outputs first, then inputs
///
/// Fails on the first malformed `control_program`; nothing is mutated.
pub fn collect(transactions: &[Transaction]) -> AnnotateResult<Collection> {
    let mut collection = Collection::default();

    for (tx, transaction) in transactions.iter().enumerate() {
        index_outputs(&mut collection, tx, &transaction.outputs)?;
        index_inputs(&mut collection, tx, &transaction.inputs)?;
    }

    debug!(
        transactions = transactions.len(),
        records = collection.record_count(),
        programs = collection.programs.len(),
        "collected control programs"
    );

    Ok(collection)
}

/// Index outputs for both account identity and purpose
pub fn index_outputs(
    collection: &mut Collection,
    tx: usize,
    outputs: &[TxOutput],
) -> AnnotateResult<()> {
    for (index, output) in outputs.iter().enumerate() {
        let record = RecordRef {
            tx,
            side: Side::Output,
            index,
        };
        let Some(program) = decode_program(output.control_program.as_deref(), record)? else {
            continue;
        };

        collection.add_purpose(program.clone(), record);
        collection.add_identity(program, record);
    }
    Ok(())
}

/// Index inputs for account identity; issuance inputs are skipped
pub fn index_inputs(
    collection: &mut Collection,
    tx: usize,
    inputs: &[TxInput],
) -> AnnotateResult<()> {
    for (index, input) in inputs.iter().enumerate() {
        let record = RecordRef {
            tx,
            side: Side::Input,
            index,
        };
        let Some(program) = decode_program(input.control_program.as_deref(), record)? else {
            continue;
        };

        collection.add_identity(program, record);
    }
    Ok(())
}

fn decode_program(hex_program: Option<&str>, record: RecordRef) -> AnnotateResult<Option<Vec<u8>>> {
    let Some(hex_program) = hex_program else {
        return Ok(None);
    };

    hex::decode(hex_program)
        .map(Some)
        .map_err(|e| AnnotateError::MalformedRecord {
            tx: record.tx,
            side: record.side,
            index: record.index,
            reason: format!("control_program {:?} is not hex: {}", hex_program, e),
        })
}
