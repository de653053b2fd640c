use anyhow::bail;
use cid::multihash::Code;
use cid::Cid;
use fvm_ipld_blockstore::Block;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::CborStore;
use fvm_ipld_encoding::DAG_CBOR;
use fvm_ipld_hamt::Hamt;
use fvm_ipld_hamt::{BytesKey, Error as HamtError};
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;
use thiserror::Error;

/// This value has been chosen to optimise to reduce load costs when accessing the balances map.
/// Ledgers with many holders might find a wider value to be more efficient.
pub const DEFAULT_HAMT_BIT_WIDTH: u32 = 3;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("ipld hamt error: {0}")]
    IpldHamt(#[from] HamtError),
    #[error("missing state at cid: {0}")]
    MissingState(Cid),
    #[error("underlying serialization error: {0}")]
    Serialization(String),
    #[error("{owner} holds {balance:?} which is less than the requested {amount:?}")]
    InsufficientBalance { owner: Address, balance: TokenAmount, amount: TokenAmount },
    #[error("{spender} attempted to utilise {amount:?} of allowance {allowance:?} set by {owner}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: TokenAmount,
        amount: TokenAmount,
    },
    #[error("allowance cannot be negative, cannot set allowance between {owner} and {spender} to {amount:?}")]
    NegativeAllowance { amount: TokenAmount, owner: Address, spender: Address },
}

#[derive(Error, Debug)]
pub enum StateInvariantError {
    #[error("total supply was negative: {0:?}")]
    SupplyNegative(TokenAmount),
    #[error("the account for {account} had a negative balance of {balance:?}")]
    BalanceNegative { account: Address, balance: TokenAmount },
    #[error("the total supply {supply:?} does not match the sum of all balances {balance_sum:?}")]
    BalanceSupplyMismatch { supply: TokenAmount, balance_sum: TokenAmount },
    #[error("a negative allowance of {allowance:?} was specified between {owner} and {spender}")]
    NegativeAllowance { owner: Address, spender: Address, allowance: TokenAmount },
    #[error("stored a zero balance which should have been removed for {0}")]
    ExplicitZeroBalance(Address),
    #[error("stored a zero allowance which should have been removed between {owner} and {spender}")]
    ExplicitZeroAllowance { owner: Address, spender: Address },
    #[error("stored an allowance map for {0} though they have specified no allowances")]
    ExplicitEmptyAllowance(Address),
    #[error("invalid serialized address key {0:?}")]
    InvalidAddressKey(BytesKey),
    #[error("underlying state error {0}")]
    State(#[from] StateError),
}

impl From<HamtError> for StateInvariantError {
    fn from(err: HamtError) -> Self {
        StateInvariantError::State(StateError::IpldHamt(err))
    }
}

type Result<T> = std::result::Result<T, StateError>;

type Map<'bs, BS, K, V> = Hamt<&'bs BS, V, K>;
type BalanceMap<'bs, BS> = Map<'bs, BS, BytesKey, TokenAmount>;
type AllowanceMap<'bs, BS> = Map<'bs, BS, BytesKey, Cid>;
type OwnerAllowanceMap<'bs, BS> = Map<'bs, BS, BytesKey, TokenAmount>;

/// Ledger state IPLD structure
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct LedgerState {
    /// Total supply of the token, fixed once the creator has been credited
    pub supply: TokenAmount,
    /// Map<Address, TokenAmount> of balances as a Hamt
    pub balances: Cid,
    /// Map<Address, Map<Address, TokenAmount>> as a Hamt. Allowances are stored allowances[owner][spender]
    pub allowances: Cid,
    /// Bit-width to use when loading Hamts
    hamt_bit_width: u32,
}

/// An abstraction over the IPLD layer to get and modify ledger state without dealing with HAMTs etc.
///
/// This is a simple wrapper of state and does not enforce ledger rules such as rejecting the null
/// address. That is left to the caller. Non-negative balances and allowances are enforced here.
impl LedgerState {
    /// Create a new ledger state-tree, without committing it (the root cid) to a blockstore
    pub fn new<BS: Blockstore>(store: &BS) -> Result<Self> {
        Self::new_with_bit_width(store, DEFAULT_HAMT_BIT_WIDTH)
    }

    /// Create a new ledger state-tree, without committing it (the root cid) to a blockstore
    ///
    /// Explicitly sets the bit width of underlying Hamt structures. Caller must ensure
    /// 1 <= hamt_bit_width <= 8.
    pub fn new_with_bit_width<BS: Blockstore>(store: &BS, hamt_bit_width: u32) -> Result<Self> {
        // Blockstore is still needed to create valid Cids for the Hamts
        let empty_balance_map = BalanceMap::new_with_bit_width(store, hamt_bit_width).flush()?;
        let empty_allowances_map =
            AllowanceMap::new_with_bit_width(store, hamt_bit_width).flush()?;

        Ok(Self {
            supply: Default::default(),
            balances: empty_balance_map,
            allowances: empty_allowances_map,
            hamt_bit_width,
        })
    }

    /// Loads a fresh copy of the state from a blockstore from a given cid
    pub fn load<BS: Blockstore>(bs: &BS, cid: &Cid) -> Result<Self> {
        match bs.get_cbor::<Self>(cid) {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(StateError::MissingState(*cid)),
            Err(err) => Err(StateError::Serialization(err.to_string())),
        }
    }

    /// Saves the current state to the blockstore, returning the cid
    pub fn save<BS: Blockstore>(&self, bs: &BS) -> Result<Cid> {
        let serialized = fvm_ipld_encoding::to_vec(self)
            .map_err(|err| StateError::Serialization(err.to_string()))?;
        let block = Block { codec: DAG_CBOR, data: serialized };
        bs.put(Code::Blake2b256, &block).map_err(|err| StateError::Serialization(err.to_string()))
    }

    pub fn hamt_bit_width(&self) -> u32 {
        self.hamt_bit_width
    }

    /// Get the balance of an address from the currently stored state
    pub fn get_balance<BS: Blockstore>(&self, bs: &BS, owner: &Address) -> Result<TokenAmount> {
        let balances = self.get_balance_map(bs)?;

        let balance = match balances.get(&address_key(owner))? {
            Some(amount) => amount.clone(),
            None => TokenAmount::zero(),
        };

        Ok(balance)
    }

    /// Changes the balance of the specified account by the delta
    ///
    /// A delta that would leave the account negative is rejected and the state is untouched.
    /// Returns the new balance of the account.
    pub fn change_balance_by<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: &Address,
        delta: &TokenAmount,
    ) -> Result<TokenAmount> {
        if delta.is_zero() {
            // This is a no-op as far as mutating state
            return self.get_balance(bs, owner);
        }

        let mut balance_map = self.get_balance_map(bs)?;
        let owner_key = address_key(owner);
        let balance = match balance_map.get(&owner_key)? {
            Some(amount) => amount.clone(),
            None => TokenAmount::zero(),
        };

        let new_balance = &balance + delta;

        if new_balance.is_negative() {
            return Err(StateError::InsufficientBalance {
                owner: *owner,
                balance,
                amount: -delta.clone(),
            });
        }

        if new_balance.is_zero() {
            balance_map.delete(&owner_key)?;
        } else {
            balance_map.set(owner_key, new_balance.clone())?;
        }

        self.balances = balance_map.flush()?;

        Ok(new_balance)
    }

    /// Retrieve the balance map as a HAMT
    pub fn get_balance_map<'bs, BS: Blockstore>(&self, bs: &'bs BS) -> Result<BalanceMap<'bs, BS>> {
        Ok(BalanceMap::load_with_bit_width(&self.balances, bs, self.hamt_bit_width)?)
    }

    /// Retrieve the number of addresses holding a non-zero balance
    ///
    /// This involves iterating through the entire HAMT
    pub fn count_balances<BS: Blockstore>(&self, bs: &BS) -> Result<usize> {
        let balance_map = self.get_balance_map(bs)?;
        let mut count = 0;
        balance_map.for_each(|_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Get the allowance that an owner has approved for a spender
    ///
    /// If an existing allowance cannot be found, it is implicitly assumed to be zero
    pub fn get_allowance_between<BS: Blockstore>(
        &self,
        bs: &BS,
        owner: &Address,
        spender: &Address,
    ) -> Result<TokenAmount> {
        match self.get_owner_allowance_map(bs, owner)? {
            Some(map) => match map.get(&address_key(spender))? {
                Some(allowance) => Ok(allowance.clone()),
                None => Ok(TokenAmount::zero()),
            },
            None => Ok(TokenAmount::zero()),
        }
    }

    /// Set the allowance between owner and spender to a specific amount, returning the old allowance
    ///
    /// A zero amount removes the entry, and the owner's map if it becomes empty.
    pub fn set_allowance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: &Address,
        spender: &Address,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        if amount.is_negative() {
            return Err(StateError::NegativeAllowance {
                owner: *owner,
                spender: *spender,
                amount: amount.clone(),
            });
        }

        let mut root_allowances_map = self.get_allowances_map(bs)?;

        // get or create the owner's allowance map
        let owner_key = address_key(owner);
        let mut allowance_map = match root_allowances_map.get(&owner_key)? {
            Some(cid) => OwnerAllowanceMap::load_with_bit_width(cid, bs, self.hamt_bit_width)?,
            None => {
                if amount.is_zero() {
                    // nothing stored and nothing to store
                    return Ok(TokenAmount::zero());
                }
                OwnerAllowanceMap::new_with_bit_width(bs, self.hamt_bit_width)
            }
        };

        let spender_key = address_key(spender);
        let old_allowance = match allowance_map.get(&spender_key)? {
            Some(a) => a.clone(),
            None => TokenAmount::zero(),
        };

        if amount.is_zero() {
            allowance_map.delete(&spender_key)?;
        } else {
            allowance_map.set(spender_key, amount.clone())?;
        }

        if allowance_map.is_empty() {
            root_allowances_map.delete(&owner_key)?;
        } else {
            root_allowances_map.set(owner_key, allowance_map.flush()?)?;
        }

        self.allowances = root_allowances_map.flush()?;

        Ok(old_allowance)
    }

    /// Atomically checks if amount is within the allowance and deducts it if so
    ///
    /// Returns new allowance if successful, else returns an error and the allowance is unchanged
    pub fn attempt_use_allowance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        spender: &Address,
        owner: &Address,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        let current_allowance = self.get_allowance_between(bs, owner, spender)?;

        if current_allowance < *amount {
            return Err(StateError::InsufficientAllowance {
                owner: *owner,
                spender: *spender,
                allowance: current_allowance,
                amount: amount.clone(),
            });
        }

        if amount.is_zero() {
            return Ok(current_allowance);
        }

        let new_allowance = current_allowance - amount.clone();
        self.set_allowance(bs, owner, spender, &new_allowance)?;

        Ok(new_allowance)
    }

    /// Get the allowances map of a specific owner, resolving the CID link to a Hamt
    ///
    /// Ok(Some) if the owner has non-zero allowances for other addresses
    /// Ok(None) if the owner has no current non-zero allowances
    /// Err if operations on the underlying Hamt failed
    pub fn get_owner_allowance_map<'bs, BS: Blockstore>(
        &self,
        bs: &'bs BS,
        owner: &Address,
    ) -> Result<Option<OwnerAllowanceMap<'bs, BS>>> {
        let allowances_map = self.get_allowances_map(bs)?;
        let owner_allowances = match allowances_map.get(&address_key(owner))? {
            Some(cid) => {
                Some(OwnerAllowanceMap::load_with_bit_width(cid, bs, self.hamt_bit_width)?)
            }
            None => None,
        };
        Ok(owner_allowances)
    }

    /// Get the global allowances map
    ///
    /// Gets a HAMT with CIDs linking to other HAMTs
    pub fn get_allowances_map<'bs, BS: Blockstore>(
        &self,
        bs: &'bs BS,
    ) -> Result<AllowanceMap<'bs, BS>> {
        Ok(AllowanceMap::load_with_bit_width(&self.allowances, bs, self.hamt_bit_width)?)
    }

    /// Checks that the current state obeys all ledger invariants
    ///
    /// Checks that there are no zero balances, zero allowances or empty allowance maps explicitly
    /// stored in the blockstore. Checks that balances, total supply, allowances are never negative
    /// and that the sum of all balances matches the total supply.
    ///
    /// Returns a summary of the state that was inspected.
    pub fn check_invariants<BS: Blockstore>(
        &self,
        bs: &BS,
    ) -> std::result::Result<StateSummary, StateInvariantError> {
        if self.supply.is_negative() {
            return Err(StateInvariantError::SupplyNegative(self.supply.clone()));
        }

        // check balances
        let mut balance_sum = TokenAmount::zero();
        let mut holders = 0;
        let mut maybe_err: Option<StateInvariantError> = None;
        let balances = self.get_balance_map(bs)?;
        let res = balances.for_each(|owner_key, balance| {
            let owner = match decode_address(owner_key) {
                Some(a) => a,
                None => {
                    maybe_err = Some(StateInvariantError::InvalidAddressKey(owner_key.clone()));
                    bail!("invariant failed")
                }
            };
            if balance.is_negative() {
                maybe_err = Some(StateInvariantError::BalanceNegative {
                    account: owner,
                    balance: balance.clone(),
                });
                bail!("invariant failed")
            }
            // zero balances should not be stored in the Hamt
            if balance.is_zero() {
                maybe_err = Some(StateInvariantError::ExplicitZeroBalance(owner));
                bail!("invariant failed")
            }

            balance_sum += balance.clone();
            holders += 1;
            Ok(())
        });

        if let Some(err) = maybe_err {
            return Err(err);
        }
        res?;

        if balance_sum != self.supply {
            return Err(StateInvariantError::BalanceSupplyMismatch {
                supply: self.supply.clone(),
                balance_sum,
            });
        }

        // check allowances
        let mut allowances = 0;
        let mut maybe_err: Option<StateInvariantError> = None;
        let allowances_map = self.get_allowances_map(bs)?;
        let res = allowances_map.for_each(|owner_key, _| {
            let owner = match decode_address(owner_key) {
                Some(a) => a,
                None => {
                    maybe_err = Some(StateInvariantError::InvalidAddressKey(owner_key.clone()));
                    bail!("invariant failed")
                }
            };
            let allowance_map = match self.get_owner_allowance_map(bs, &owner)? {
                Some(map) if !map.is_empty() => map,
                _ => {
                    maybe_err = Some(StateInvariantError::ExplicitEmptyAllowance(owner));
                    bail!("invariant failed")
                }
            };

            allowance_map.for_each(|spender_key, allowance| {
                let spender = match decode_address(spender_key) {
                    Some(a) => a,
                    None => {
                        maybe_err =
                            Some(StateInvariantError::InvalidAddressKey(spender_key.clone()));
                        bail!("invariant failed")
                    }
                };
                if allowance.is_negative() {
                    maybe_err = Some(StateInvariantError::NegativeAllowance {
                        owner,
                        spender,
                        allowance: allowance.clone(),
                    });
                    bail!("invariant failed")
                }
                if allowance.is_zero() {
                    maybe_err = Some(StateInvariantError::ExplicitZeroAllowance { owner, spender });
                    bail!("invariant failed")
                }
                allowances += 1;
                Ok(())
            })?;
            Ok(())
        });

        if let Some(err) = maybe_err {
            return Err(err);
        }
        res?;

        Ok(StateSummary { total_supply: self.supply.clone(), holders, allowances })
    }
}

pub fn address_key(a: &Address) -> BytesKey {
    a.to_bytes().into()
}

pub fn decode_address(key: &BytesKey) -> Option<Address> {
    Address::from_bytes(&key.0).ok()
}

/// A summary of the state produced by a successful invariant check
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSummary {
    pub total_supply: TokenAmount,
    /// Number of addresses holding a non-zero balance
    pub holders: usize,
    /// Number of non-zero (owner, spender) allowances
    pub allowances: usize,
}
