//! Host runtime: call context, transaction boundary and native value
//!
//! Every external call runs through [`Runtime::execute`], which opens a
//! [`Journal`] over the store, moves any attached native value, runs the
//! contract operation and commits only if it returned `Ok`. A failed call
//! leaves no trace, including value forwarded to other contracts during it.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::address::Address;
use crate::error::{ContractError, Result};
use crate::storage::{Journal, KeyValueStore, MapKey, MemoryStore, StorageKey, Value};

/// Storage field holding native balances under [`Address::ZERO`]
const NATIVE_BALANCE: &str = "native_balance";

/// First address handed out by [`Runtime::new_address`]
const CONTRACT_ADDRESS_BASE: u64 = 1 << 40;

/// Block the current call executes in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    /// Unix seconds
    pub timestamp: u64,
}

/// External call descriptor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Call {
    /// Sender, becomes `Env::caller`
    pub from: Address,
    /// Contract receiving any attached value
    pub to: Address,
    /// Native value attached to the call
    pub value: u128,
}

impl Call {
    pub fn new(from: Address, to: Address) -> Self {
        Self { from, to, value: 0 }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

/// Execution context of one call frame
pub struct Env<'a> {
    store: &'a mut dyn KeyValueStore,
    caller: Address,
    callee: Address,
    value: u128,
    block: BlockInfo,
}

impl<'a> Env<'a> {
    pub fn new(
        store: &'a mut dyn KeyValueStore,
        caller: Address,
        callee: Address,
        value: u128,
        block: BlockInfo,
    ) -> Self {
        Self {
            store,
            caller,
            callee,
            value,
            block,
        }
    }

    /// Principal that issued this frame
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Principal credited with [`Env::value`]
    pub fn callee(&self) -> Address {
        self.callee
    }

    /// Native value attached to this frame (already credited to the callee)
    pub fn value(&self) -> u128 {
        self.value
    }

    /// Attached value as received by `recipient`. Value credited to anyone
    /// else is rejected rather than counted.
    pub fn received(&self, recipient: Address) -> Result<u128> {
        if self.value > 0 && self.callee != recipient {
            return Err(ContractError::Unauthorized);
        }
        Ok(self.value)
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    /// Nested frame issued by `caller` (normally the calling contract's address)
    pub fn call_as(&mut self, caller: Address) -> Env<'_> {
        let callee = self.callee;
        self.call_with_value(caller, callee, 0)
    }

    /// Nested frame carrying `value` to `callee`. The caller must have moved
    /// the value with [`transfer_native`] beforehand.
    pub fn call_with_value(&mut self, caller: Address, callee: Address, value: u128) -> Env<'_> {
        Env {
            store: &mut *self.store,
            caller,
            callee,
            value,
            block: self.block,
        }
    }

    pub fn get_uint(&self, instance: Address, field: &'static str, key: MapKey) -> u128 {
        match self.store.load(&StorageKey::new(instance, field, key)) {
            Some(Value::Uint(v)) => v,
            _ => 0,
        }
    }

    pub fn set_uint(&mut self, instance: Address, field: &'static str, key: MapKey, value: u128) {
        self.store.store(StorageKey::new(instance, field, key), Value::Uint(value));
    }

    pub fn get_flag(&self, instance: Address, field: &'static str, key: MapKey) -> bool {
        matches!(
            self.store.load(&StorageKey::new(instance, field, key)),
            Some(Value::Flag(true))
        )
    }

    pub fn set_flag(&mut self, instance: Address, field: &'static str, key: MapKey, value: bool) {
        self.store.store(StorageKey::new(instance, field, key), Value::Flag(value));
    }

    pub fn get_addr(&self, instance: Address, field: &'static str, key: MapKey) -> Option<Address> {
        match self.store.load(&StorageKey::new(instance, field, key)) {
            Some(Value::Addr(addr)) => Some(addr),
            _ => None,
        }
    }

    pub fn set_addr(&mut self, instance: Address, field: &'static str, key: MapKey, value: Address) {
        self.store.store(StorageKey::new(instance, field, key), Value::Addr(value));
    }

    pub fn clear(&mut self, instance: Address, field: &'static str, key: MapKey) {
        self.store.erase(&StorageKey::new(instance, field, key));
    }
}

/// Native balance of `who`
pub fn native_balance(env: &Env<'_>, who: Address) -> u128 {
    env.get_uint(Address::ZERO, NATIVE_BALANCE, MapKey::Addr(who))
}

/// Move native value between principals
pub fn transfer_native(env: &mut Env<'_>, from: Address, to: Address, amount: u128) -> Result<()> {
    if amount == 0 || from == to {
        return Ok(());
    }
    let from_balance = native_balance(env, from);
    let new_from = from_balance
        .checked_sub(amount)
        .ok_or(ContractError::InsufficientBalance)?;
    let new_to = native_balance(env, to)
        .checked_add(amount)
        .ok_or(ContractError::Overflow)?;

    env.set_uint(Address::ZERO, NATIVE_BALANCE, MapKey::Addr(from), new_from);
    env.set_uint(Address::ZERO, NATIVE_BALANCE, MapKey::Addr(to), new_to);
    Ok(())
}

/// Single-threaded host: owns the store and the block clock
pub struct Runtime<S: KeyValueStore = MemoryStore> {
    store: S,
    block: BlockInfo,
    next_address: u64,
}

impl Runtime<MemoryStore> {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for Runtime<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KeyValueStore> Runtime<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            block: BlockInfo::default(),
            next_address: CONTRACT_ADDRESS_BASE,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    pub fn set_block(&mut self, block: BlockInfo) {
        self.block = block;
    }

    /// Advance the clock by `blocks` and `seconds`
    pub fn advance(&mut self, blocks: u64, seconds: u64) {
        self.block.height = self.block.height.saturating_add(blocks);
        self.block.timestamp = self.block.timestamp.saturating_add(seconds);
    }

    /// Fresh address for a contract about to be deployed
    pub fn new_address(&mut self) -> Address {
        let addr = Address::from_low_u64(self.next_address);
        self.next_address += 1;
        addr
    }

    pub fn native_balance(&self, who: Address) -> u128 {
        match self.store.load(&StorageKey::new(Address::ZERO, NATIVE_BALANCE, MapKey::Addr(who))) {
            Some(Value::Uint(v)) => v,
            _ => 0,
        }
    }

    /// Credit native value out of thin air (genesis allocation)
    pub fn fund(&mut self, who: Address, amount: u128) -> Result<()> {
        let block = self.block;
        let mut env = Env::new(&mut self.store, who, who, 0, block);
        let balance = native_balance(&env, who)
            .checked_add(amount)
            .ok_or(ContractError::Overflow)?;
        env.set_uint(Address::ZERO, NATIVE_BALANCE, MapKey::Addr(who), balance);
        Ok(())
    }

    /// Run `f` as one all-or-nothing transaction
    pub fn execute<T, F>(&mut self, call: Call, f: F) -> Result<T>
    where
        F: FnOnce(&mut Env<'_>) -> Result<T>,
    {
        let block = self.block;
        let mut journal = Journal::new(&mut self.store);

        let result = {
            let mut env = Env::new(&mut journal, call.from, call.to, call.value, block);
            transfer_native(&mut env, call.from, call.to, call.value).and_then(|()| f(&mut env))
        };

        match result {
            Ok(value) => {
                debug!(
                    "tx from {} to {} committed ({} slots)",
                    call.from,
                    call.to,
                    journal.pending_len()
                );
                journal.commit();
                Ok(value)
            }
            Err(err) => {
                warn!("tx from {} to {} rolled back: {}", call.from, call.to, err);
                Err(err)
            }
        }
    }

    /// Run `f` and discard every write, even on success
    pub fn query<T, F>(&mut self, caller: Address, f: F) -> Result<T>
    where
        F: FnOnce(&mut Env<'_>) -> Result<T>,
    {
        let block = self.block;
        let mut journal = Journal::new(&mut self.store);
        let mut env = Env::new(&mut journal, caller, caller, 0, block);
        f(&mut env)
    }
}

/// Runtime shared between threads.
///
/// Calls are serialized by one mutex, so contract invariants only need to
/// hold between calls, exactly as on the single-threaded host.
pub struct SharedRuntime<S: KeyValueStore = MemoryStore> {
    inner: Arc<Mutex<Runtime<S>>>,
}

impl<S: KeyValueStore> Clone for SharedRuntime<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KeyValueStore> SharedRuntime<S> {
    pub fn new(runtime: Runtime<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(runtime)),
        }
    }

    /// Exclusive access to the runtime. A panic in another holder does not
    /// leave partial state behind (journals never commit on unwind), so a
    /// poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Runtime<S>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn execute<T, F>(&self, call: Call, f: F) -> Result<T>
    where
        F: FnOnce(&mut Env<'_>) -> Result<T>,
    {
        self.lock().execute(call, f)
    }
}
