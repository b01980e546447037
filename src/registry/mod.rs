// Account registry - who controls which control program
//
// The registry is owned elsewhere; the annotator only needs one batched
// point lookup from it. Two implementations live here:
// - SqliteRegistry: the accounts / signers / control programs tables
// - MemoryRegistry: in-process map, used for embedding and tests

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRegistry;
pub use sqlite::SqliteRegistry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RegistryError;

/// One registry row: a control program and the account behind it
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramAccount {
    pub account_id: String,
    pub control_program: Vec<u8>,

    /// True when the program was issued for change outputs
    pub is_change: bool,

    /// `None` when the account has no alias
    pub alias: Option<String>,

    /// Raw JSON tag blob; `None` or empty when the account has no tags
    pub tags: Option<Vec<u8>>,
}

/// Batched lookup of control programs
///
/// Implementations must answer the whole key set in a single round-trip.
/// Programs without an owning account are left out of the result.
pub trait AccountRegistry {
    fn resolve(
        &self,
        programs: &[Vec<u8>],
        ctx: &LookupContext,
    ) -> Result<Vec<ProgramAccount>, RegistryError>;
}

impl<R: AccountRegistry + ?Sized> AccountRegistry for &R {
    fn resolve(
        &self,
        programs: &[Vec<u8>],
        ctx: &LookupContext,
    ) -> Result<Vec<ProgramAccount>, RegistryError> {
        (**self).resolve(programs, ctx)
    }
}

// ============================================================================
// LOOKUP CONTEXT
// ============================================================================

/// Caller-supplied cancellation and deadline for the registry round-trip
#[derive(Debug, Clone, Default)]
pub struct LookupContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl LookupContext {
    /// Context that never cancels and never expires
    pub fn background() -> Self {
        LookupContext::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        LookupContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        LookupContext::with_deadline(Instant::now() + timeout)
    }

    /// Handle another thread can use to cancel this context
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Error the lookup should fail with, if any
    pub fn check(&self) -> Result<(), RegistryError> {
        if self.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }
        if self.is_expired() {
            return Err(RegistryError::DeadlineExceeded);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
