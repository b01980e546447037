// Error types for the annotation pipeline
//
// Two failure classes reach the caller: a malformed batch or record,
// or a failed registry lookup. Both are fatal for the whole call.

use std::fmt;
use thiserror::Error;

/// Which side of a transaction a record lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Input,
    Output,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Input => "input",
            Side::Output => "output",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the external account registry lookup
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("registry lookup cancelled")]
    Cancelled,

    #[error("registry lookup exceeded its deadline")]
    DeadlineExceeded,

    #[error("registry returned undecodable tags for account {account_id}: {source}")]
    CorruptTags {
        account_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Error returned by the annotator
#[derive(Debug, Error)]
pub enum AnnotateError {
    /// A record is not an object, or its `control_program` is not a hex string
    #[error("malformed record on tx {tx} {side} {index}: {reason}")]
    MalformedRecord {
        tx: usize,
        side: Side,
        index: usize,
        reason: String,
    },

    /// The batch or a transaction is not shaped like one (not a list,
    /// not an object, `inputs`/`outputs` not lists)
    #[error("malformed transaction batch: {reason}")]
    MalformedBatch { reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AnnotateError {
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            AnnotateError::MalformedRecord { .. } | AnnotateError::MalformedBatch { .. }
        )
    }
}

pub type AnnotateResult<T> = Result<T, AnnotateError>;
