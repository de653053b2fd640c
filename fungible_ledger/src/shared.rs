use std::sync::Arc;

use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use parking_lot::Mutex;

use crate::ledger::types::{ApproveReturn, TransferFromReturn, TransferReturn};
use crate::ledger::{Ledger, LedgerError};

type Result<T> = std::result::Result<T, LedgerError>;

/// A [`Ledger`] behind a single exclusive lock
///
/// Each operation holds the lock for its whole duration and never acquires it twice, so
/// operations from different threads are serialized and never observe each other half-done.
/// Clones refer to the same ledger.
pub struct SharedLedger<BS>
where
    BS: Blockstore,
{
    inner: Arc<Mutex<Ledger<BS>>>,
}

impl<BS> Clone for SharedLedger<BS>
where
    BS: Blockstore,
{
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<BS> SharedLedger<BS>
where
    BS: Blockstore,
{
    pub fn new(ledger: Ledger<BS>) -> Self {
        Self { inner: Arc::new(Mutex::new(ledger)) }
    }

    pub fn transfer(
        &self,
        caller: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferReturn> {
        self.inner.lock().transfer(caller, to, amount)
    }

    pub fn approve(
        &self,
        caller: &Address,
        spender: &Address,
        amount: &TokenAmount,
    ) -> Result<ApproveReturn> {
        self.inner.lock().approve(caller, spender, amount)
    }

    pub fn transfer_from(
        &self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferFromReturn> {
        self.inner.lock().transfer_from(caller, from, to, amount)
    }

    pub fn balance_of(&self, owner: &Address) -> Result<TokenAmount> {
        self.inner.lock().balance_of(owner)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Result<TokenAmount> {
        self.inner.lock().allowance(owner, spender)
    }

    pub fn total_supply(&self) -> TokenAmount {
        self.inner.lock().total_supply()
    }

    /// Runs a read-only closure against a consistent snapshot of the ledger
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Ledger<BS>) -> R,
    {
        f(&self.inner.lock())
    }
}
