// In-memory account registry
//
// Holds accounts and their control programs behind Arc<RwLock<..>> so a
// registry can be shared between threads and cloned cheaply. Every lookup
// is recorded, which lets callers see exactly which key sets were asked for.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{AccountRegistry, LookupContext, ProgramAccount};
use crate::error::RegistryError;

/// Account as the registry stores it
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredAccount {
    pub account_id: String,
    pub alias: Option<String>,
    pub tags: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct RegisteredProgram {
    account_id: String,
    is_change: bool,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, RegisteredAccount>,
    programs: HashMap<Vec<u8>, RegisteredProgram>,
    lookups: Vec<Vec<Vec<u8>>>,
    unavailable: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<RwLock<State>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry::default()
    }

    /// Register (or replace) an account
    pub fn register_account(&self, account_id: &str, alias: Option<&str>, tags: Option<&[u8]>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.accounts.insert(
            account_id.to_string(),
            RegisteredAccount {
                account_id: account_id.to_string(),
                alias: alias.map(str::to_string),
                tags: tags.map(<[u8]>::to_vec),
            },
        );
    }

    /// Attach a control program to an account id
    ///
    /// The account does not have to be registered: such programs behave like
    /// a signer with no account row and resolve without alias or tags.
    pub fn add_control_program(&self, account_id: &str, program: &[u8], is_change: bool) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.programs.insert(
            program.to_vec(),
            RegisteredProgram {
                account_id: account_id.to_string(),
                is_change,
            },
        );
    }

    /// Make every following lookup fail with `RegistryError::Unavailable`
    pub fn set_unavailable(&self, reason: Option<&str>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.unavailable = reason.map(str::to_string);
    }

    /// Key sets received so far, one entry per lookup
    pub fn lookups(&self) -> Vec<Vec<Vec<u8>>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.lookups.clone()
    }

    pub fn lookup_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.lookups.len()
    }
}

impl AccountRegistry for MemoryRegistry {
    fn resolve(
        &self,
        programs: &[Vec<u8>],
        ctx: &LookupContext,
    ) -> Result<Vec<ProgramAccount>, RegistryError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| RegistryError::Unavailable("registry lock poisoned".to_string()))?;

        state.lookups.push(programs.to_vec());

        if let Some(reason) = &state.unavailable {
            return Err(RegistryError::Unavailable(reason.clone()));
        }
        ctx.check()?;

        let rows = programs
            .iter()
            .filter_map(|program| {
                let registered = state.programs.get(program)?;
                let account = state.accounts.get(&registered.account_id);
                Some(ProgramAccount {
                    account_id: registered.account_id.clone(),
                    control_program: program.clone(),
                    is_change: registered.is_change,
                    alias: account.and_then(|a| a.alias.clone()),
                    tags: account.and_then(|a| a.tags.clone()),
                })
            })
            .collect();

        Ok(rows)
    }
}
