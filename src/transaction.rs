// 🧾 Decoded transactions - typed inputs and outputs
//
// Records carry a small set of known fields plus an open `extra` map, so a
// transaction handed to us by the decoder round-trips through JSON untouched.
// Annotation fields stay `None` until the annotator knows the owning account.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{AnnotateError, AnnotateResult, Side};

// ============================================================================
// PURPOSE
// ============================================================================

/// Why an output exists from the owning account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Output pays back into the spending account
    Change,

    /// Output pays into an account from someone else
    Receive,
}

impl Purpose {
    pub fn from_change_flag(is_change: bool) -> Self {
        if is_change {
            Purpose::Change
        } else {
            Purpose::Receive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Change => "change",
            Purpose::Receive => "receive",
        }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Transaction input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hex-encoded control program (absent on issuance inputs)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_program: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_alias: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_tags: Option<Value>,

    /// Everything else the decoder produced (asset, amount, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transaction output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_program: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_alias: Option<String>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_tags: Option<Value>,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Purpose>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TxInput {
    /// Input spending the given hex control program
    pub fn spending(control_program: &str) -> Self {
        TxInput {
            control_program: Some(control_program.to_string()),
            ..Default::default()
        }
    }

    /// Issuance input (no control program)
    pub fn issuance() -> Self {
        TxInput::default()
    }

    pub fn has_account(&self) -> bool {
        self.account_id.is_some()
    }
}

impl TxOutput {
    /// Output locked by the given hex control program
    pub fn to_program(control_program: &str) -> Self {
        TxOutput {
            control_program: Some(control_program.to_string()),
            ..Default::default()
        }
    }

    pub fn has_account(&self) -> bool {
        self.account_id.is_some()
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub inputs: Vec<TxInput>,

    #[serde(default)]
    pub outputs: Vec<TxOutput>,

    /// Transaction-level fields (id, timestamp, ...) passed through as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Transaction {
            inputs,
            outputs,
            extra: Map::new(),
        }
    }

    /// Decode one transaction; `position` is its index within the batch
    ///
    /// Records are decoded one at a time so a bad `control_program`
    /// (a number, an object, ...) is reported with its exact location.
    pub fn from_json(position: usize, value: Value) -> AnnotateResult<Self> {
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return Err(AnnotateError::MalformedBatch {
                    reason: format!(
                        "transaction {} is a {}, expected an object",
                        position,
                        type_name(&other)
                    ),
                })
            }
        };

        let outputs = decode_records(position, Side::Output, object.remove("outputs"))?;
        let inputs = decode_records(position, Side::Input, object.remove("inputs"))?;

        Ok(Transaction {
            inputs,
            outputs,
            extra: object,
        })
    }

    /// Number of records (inputs + outputs) in this transaction
    pub fn record_count(&self) -> usize {
        self.inputs.len() + self.outputs.len()
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// Annotation keys and the values they may hold on an incoming record
const ANNOTATION_KEYS: [&str; 3] = ["account_id", "account_alias", "purpose"];

trait Record: serde::de::DeserializeOwned {
    fn extra_mut(&mut self) -> &mut Map<String, Value>;
}

impl Record for TxInput {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

impl Record for TxOutput {
    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.extra
    }
}

fn is_annotation_value(key: &str, value: &Value) -> bool {
    match (key, value) {
        (_, Value::Null) => true,
        ("purpose", Value::String(s)) => s == "change" || s == "receive",
        (_, Value::String(_)) => true,
        _ => false,
    }
}

/// Pull annotation keys whose values could not have come from us
///
/// They travel in `extra` untouched; only `control_program` is checked.
fn set_aside_foreign_annotations(record: &mut Map<String, Value>) -> Map<String, Value> {
    let mut foreign = Map::new();
    for key in ANNOTATION_KEYS {
        let keep = record
            .get(key)
            .map_or(true, |value| is_annotation_value(key, value));
        if !keep {
            if let Some(value) = record.remove(key) {
                foreign.insert(key.to_string(), value);
            }
        }
    }
    foreign
}

fn decode_records<T: Record>(tx: usize, side: Side, value: Option<Value>) -> AnnotateResult<Vec<T>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(AnnotateError::MalformedBatch {
                reason: format!(
                    "transaction {} has {}s as a {}, expected a list",
                    tx,
                    side,
                    type_name(&other)
                ),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let malformed = |reason: String| AnnotateError::MalformedRecord {
                tx,
                side,
                index,
                reason,
            };

            let mut object = match item {
                Value::Object(object) => object,
                other => return Err(malformed(format!("expected map, got {}", type_name(&other)))),
            };
            let foreign = set_aside_foreign_annotations(&mut object);

            let mut record: T =
                serde_json::from_value(Value::Object(object)).map_err(|e| malformed(e.to_string()))?;
            record.extra_mut().extend(foreign);
            Ok(record)
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a JSON array of transactions
pub fn transactions_from_json(value: Value) -> AnnotateResult<Vec<Transaction>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(position, item)| Transaction::from_json(position, item))
            .collect(),
        other => Err(AnnotateError::MalformedBatch {
            reason: format!("batch is a {}, expected a list of transactions", type_name(&other)),
        }),
    }
}

/// Load transactions from a JSON file
pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read transactions file: {:?}", path))?;

    let value: Value =
        serde_json::from_str(&content).context("Failed to parse transactions JSON")?;

    let transactions = transactions_from_json(value)?;
    Ok(transactions)
}

/// Write transactions as pretty JSON
pub fn save_transactions(path: &Path, transactions: &[Transaction]) -> Result<()> {
    let json = serde_json::to_string_pretty(transactions)?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}
