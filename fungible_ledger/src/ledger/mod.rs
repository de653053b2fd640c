use std::ops::Neg;

use cid::Cid;
pub use error::LedgerError;
use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use tracing::debug;

use self::events::{ApprovalEvent, EventLog, LedgerEvent, TransferEvent};
use self::state::{LedgerState, StateInvariantError, StateSummary};
use self::types::{ApproveReturn, TokenMetadata, TransferFromReturn, TransferReturn};
use crate::address::is_null_address;
use crate::config::LedgerConfig;

mod error;
pub mod events;
pub mod state;
pub mod types;

/// Number of decimal places between a whole token and its smallest unit. Matches the atto
/// precision of [`TokenAmount`].
pub const DECIMALS: u8 = 18;

/// Ratio of integral units to whole tokens, aka "18 decimals".
pub const TOKEN_PRECISION: u64 = 1_000_000_000_000_000_000;

type Result<T> = std::result::Result<T, LedgerError>;

/// A fungible token ledger: balances, allowances and the notifications emitted by mutating them
///
/// The caller of each mutating operation is passed in explicitly and is assumed to have been
/// authenticated already. Every operation validates its preconditions against the current state
/// before anything is written, so a rejected operation leaves the ledger untouched.
pub struct Ledger<BS>
where
    BS: Blockstore,
{
    /// Backing store for the state HAMTs
    bs: BS,
    metadata: TokenMetadata,
    state: LedgerState,
    events: EventLog,
}

impl<BS> Ledger<BS>
where
    BS: Blockstore,
{
    /// Creates a ledger, crediting the entire initial supply to the creator
    ///
    /// The initial supply in the config is expressed in whole tokens and scaled by
    /// 10^[`DECIMALS`].
    pub fn new(bs: BS, config: &LedgerConfig, creator: &Address) -> Result<Self> {
        config.validate()?;
        if is_null_address(creator) {
            return Err(LedgerError::InvalidRecipient(*creator));
        }

        let mut state = LedgerState::new_with_bit_width(&bs, config.hamt_bit_width)?;
        let supply = TokenAmount::from_whole(config.initial_supply);
        state.change_balance_by(&bs, creator, &supply)?;
        state.supply = supply;

        debug!(
            name = %config.name,
            symbol = %config.symbol,
            %creator,
            supply = %state.supply.atto(),
            "ledger created"
        );

        Ok(Self {
            bs,
            metadata: TokenMetadata {
                name: config.name.clone(),
                symbol: config.symbol.clone(),
                decimals: DECIMALS,
            },
            state,
            events: EventLog::new(),
        })
    }

    /// Reopens a ledger from a state root previously returned by [`Ledger::flush`]
    ///
    /// The event log of a reopened ledger starts empty.
    pub fn load(bs: BS, metadata: TokenMetadata, state_cid: &Cid) -> Result<Self> {
        let state = LedgerState::load(&bs, state_cid)?;
        Ok(Self { bs, metadata, state, events: EventLog::new() })
    }

    /// Flush state and return Cid for root
    pub fn flush(&self) -> Result<Cid> {
        Ok(self.state.save(&self.bs)?)
    }

    /// Get a reference to the wrapped state tree
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn blockstore(&self) -> &BS {
        &self.bs
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    /// Notifications emitted so far, oldest first
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Opens an atomic transaction on LedgerState which allows a closure to make multiple
    /// modifications to the state tree.
    ///
    /// If the closure returns an error, the transaction is dropped atomically and no change is
    /// observed on ledger state.
    fn transaction<F, Res>(&mut self, f: F) -> Result<Res>
    where
        F: FnOnce(&mut LedgerState, &BS) -> Result<Res>,
    {
        let mut mutable_state = self.state.clone();
        let res = f(&mut mutable_state, &self.bs)?;
        // if closure didn't error, save state
        self.state = mutable_state;
        Ok(res)
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }
}

impl<BS> Ledger<BS>
where
    BS: Blockstore,
{
    /// Gets the total number of tokens in existence
    ///
    /// This equals the sum of `balance_of` called on all addresses and never changes after
    /// creation.
    pub fn total_supply(&self) -> TokenAmount {
        self.state.supply.clone()
    }

    /// Returns the balance associated with a particular address
    ///
    /// Addresses that have never received tokens implicitly have a zero balance
    pub fn balance_of(&self, owner: &Address) -> Result<TokenAmount> {
        Ok(self.state.get_balance(&self.bs, owner)?)
    }

    /// Gets the allowance that `owner` has granted to `spender`
    ///
    /// Pairs that were never approved implicitly have a zero allowance
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Result<TokenAmount> {
        Ok(self.state.get_allowance_between(&self.bs, owner, spender)?)
    }

    /// Number of addresses currently holding a non-zero balance
    pub fn holder_count(&self) -> Result<usize> {
        Ok(self.state.count_balances(&self.bs)?)
    }

    /// Transfers an amount from the caller to another address
    ///
    /// - The recipient MUST NOT be the null address
    /// - The requested value MUST be non-negative
    /// - The requested value MUST NOT exceed the caller's balance
    ///
    /// Upon successful transfer the caller's balance decreases and the recipient's balance
    /// increases by the requested value, and a `Transfer` event is emitted. Zero-value transfers
    /// and transfers to self succeed and emit the event without changing any balance.
    pub fn transfer(
        &mut self,
        caller: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferReturn> {
        let res = self.apply_transfer(caller, to, amount);
        log_rejection("transfer", caller, &res);
        res
    }

    fn apply_transfer(
        &mut self,
        caller: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferReturn> {
        if is_null_address(to) {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        let amount = validate_amount(amount, "transfer")?;
        self.ensure_balance(caller, amount)?;

        let ret = self.transaction(|state, bs| {
            // don't change balance if to == caller, the balance check above still applies
            if to == caller {
                let balance = state.get_balance(bs, caller)?;
                return Ok(TransferReturn { from_balance: balance.clone(), to_balance: balance });
            }
            let from_balance = state.change_balance_by(bs, caller, &amount.clone().neg())?;
            let to_balance = state.change_balance_by(bs, to, amount)?;
            Ok(TransferReturn { from_balance, to_balance })
        })?;

        self.emit(LedgerEvent::Transfer(TransferEvent {
            from: *caller,
            to: *to,
            value: amount.clone(),
        }));
        debug!(from = %caller, %to, value = %amount.atto(), "transfer");

        Ok(ret)
    }

    /// Sets the allowance of `spender` over the caller's balance to exactly `amount`
    ///
    /// - The spender MUST NOT be the null address
    /// - The requested value MUST be non-negative
    ///
    /// Any previous allowance is replaced, not added to. The caller's balance is not consulted:
    /// an allowance is a ceiling on delegated spending, independent of current funds. An
    /// `Approval` event is emitted on success.
    pub fn approve(
        &mut self,
        caller: &Address,
        spender: &Address,
        amount: &TokenAmount,
    ) -> Result<ApproveReturn> {
        let res = self.apply_approve(caller, spender, amount);
        log_rejection("approve", caller, &res);
        res
    }

    fn apply_approve(
        &mut self,
        caller: &Address,
        spender: &Address,
        amount: &TokenAmount,
    ) -> Result<ApproveReturn> {
        if is_null_address(spender) {
            return Err(LedgerError::InvalidSpender(*spender));
        }
        let amount = validate_amount(amount, "approve")?;

        let previous_allowance =
            self.transaction(|state, bs| Ok(state.set_allowance(bs, caller, spender, amount)?))?;

        self.emit(LedgerEvent::Approval(ApprovalEvent {
            owner: *caller,
            spender: *spender,
            value: amount.clone(),
        }));
        debug!(owner = %caller, %spender, value = %amount.atto(), "approve");

        Ok(ApproveReturn { previous_allowance, allowance: amount.clone() })
    }

    /// Transfers an amount from `from` to `to`, spending the caller's allowance
    ///
    /// Preconditions are checked in order and the first failure is reported:
    /// - The recipient MUST NOT be the null address
    /// - The requested value MUST be non-negative
    /// - The requested value MUST NOT exceed the allowance `from` granted the caller
    /// - The requested value MUST NOT exceed the balance of `from`
    ///
    /// Upon successful transfer:
    /// - The from balance decreases by the requested value
    /// - The to balance increases by the requested value
    /// - The from-caller allowance decreases by the requested value
    /// - A `Transfer` event is emitted
    pub fn transfer_from(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferFromReturn> {
        let res = self.apply_transfer_from(caller, from, to, amount);
        log_rejection("transfer_from", caller, &res);
        res
    }

    fn apply_transfer_from(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: &TokenAmount,
    ) -> Result<TransferFromReturn> {
        if is_null_address(to) {
            return Err(LedgerError::InvalidRecipient(*to));
        }
        let amount = validate_amount(amount, "transfer_from")?;

        let allowance = self.allowance(from, caller)?;
        if allowance < *amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                spender: *caller,
                allowance,
                amount: amount.clone(),
            });
        }
        self.ensure_balance(from, amount)?;

        let ret = self.transaction(|state, bs| {
            let allowance = state.attempt_use_allowance(bs, caller, from, amount)?;
            // don't change balance if to == from, the balance check above still applies
            if to == from {
                let balance = state.get_balance(bs, from)?;
                return Ok(TransferFromReturn {
                    from_balance: balance.clone(),
                    to_balance: balance,
                    allowance,
                });
            }
            let from_balance = state.change_balance_by(bs, from, &amount.clone().neg())?;
            let to_balance = state.change_balance_by(bs, to, amount)?;
            Ok(TransferFromReturn { from_balance, to_balance, allowance })
        })?;

        self.emit(LedgerEvent::Transfer(TransferEvent {
            from: *from,
            to: *to,
            value: amount.clone(),
        }));
        debug!(
            spender = %caller,
            %from,
            %to,
            value = %amount.atto(),
            remaining_allowance = %ret.allowance.atto(),
            "transfer_from"
        );

        Ok(ret)
    }

    fn ensure_balance(&self, owner: &Address, amount: &TokenAmount) -> Result<()> {
        let balance = self.balance_of(owner)?;
        if balance < *amount {
            return Err(LedgerError::InsufficientBalance {
                owner: *owner,
                balance,
                amount: amount.clone(),
            });
        }
        Ok(())
    }

    /// Checks the state invariants, throwing an error if they are not met
    pub fn assert_invariants(&self) -> std::result::Result<StateSummary, StateInvariantError> {
        self.state.check_invariants(&self.bs)
    }
}

fn log_rejection<T>(operation: &'static str, caller: &Address, res: &Result<T>) {
    if let Err(err) = res {
        debug!(operation, %caller, error = %err, "rejected");
    }
}

/// Validates that a token amount for transfer or approval is non-negative
///
/// Returns the argument, or an error.
pub fn validate_amount<'a>(a: &'a TokenAmount, name: &'static str) -> Result<&'a TokenAmount> {
    if a.is_negative() {
        return Err(LedgerError::InvalidNegative { name, amount: a.clone() });
    }
    Ok(a)
}
