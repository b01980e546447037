// Account Annotator - Core Library
// Enriches decoded transactions with the identity of the accounts that
// control their inputs and outputs, using one batched registry lookup.

pub mod error;
pub mod transaction;
pub mod registry;
pub mod collector;   // Collect: control programs → records
pub mod resolver;    // Resolve: one batched registry lookup
pub mod distributor; // Distribute: resolutions → records
pub mod annotator;
pub mod config;
pub mod import;

// Re-export commonly used types
pub use error::{AnnotateError, AnnotateResult, RegistryError, Side};
pub use transaction::{
    Purpose, Transaction, TxInput, TxOutput,
    load_transactions, save_transactions, transactions_from_json,
};
pub use registry::{
    AccountRegistry, CancelHandle, LookupContext, MemoryRegistry, ProgramAccount, SqliteRegistry,
};
pub use collector::{Collection, RecordRef, collect, index_inputs, index_outputs};
pub use resolver::{Resolution, resolve};
pub use distributor::{AnnotationSummary, distribute};
pub use annotator::{Annotator, annotate_txs};
pub use config::AnnotatorConfig;
pub use import::{ImportStats, RegistryCsvRow, import_rows, load_registry_csv};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
