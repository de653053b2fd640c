use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::state::StateError as LedgerStateError;
use crate::ledger::state::StateInvariantError;

/// Reasons a ledger operation is rejected
///
/// A rejected operation never leaves a partial effect on balances or allowances.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{0} is the null address and cannot receive tokens")]
    InvalidRecipient(Address),
    #[error("{0} is the null address and cannot be approved as a spender")]
    InvalidSpender(Address),
    #[error("value {amount:?} for {name:?} must be non-negative")]
    InvalidNegative { name: &'static str, amount: TokenAmount },
    #[error("{owner} holds {balance:?} which is less than the requested {amount:?}")]
    InsufficientBalance { owner: Address, balance: TokenAmount, amount: TokenAmount },
    #[error("{spender} attempted to spend {amount:?} of allowance {allowance:?} set by {owner}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: TokenAmount,
        amount: TokenAmount,
    },
    #[error("invalid ledger configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("error in underlying state {0}")]
    LedgerState(LedgerStateError),
    #[error("error in state invariants {0}")]
    StateInvariant(#[from] StateInvariantError),
}

impl From<LedgerStateError> for LedgerError {
    fn from(error: LedgerStateError) -> Self {
        match error {
            LedgerStateError::InsufficientBalance { owner, balance, amount } => {
                LedgerError::InsufficientBalance { owner, balance, amount }
            }
            LedgerStateError::InsufficientAllowance { owner, spender, allowance, amount } => {
                LedgerError::InsufficientAllowance { owner, spender, allowance, amount }
            }
            other => LedgerError::LedgerState(other),
        }
    }
}

impl From<&LedgerError> for ExitCode {
    fn from(error: &LedgerError) -> Self {
        match error {
            LedgerError::InvalidRecipient(_)
            | LedgerError::InvalidSpender(_)
            | LedgerError::InvalidNegative { name: _, amount: _ }
            | LedgerError::Config(_) => ExitCode::USR_ILLEGAL_ARGUMENT,
            LedgerError::InsufficientBalance { owner: _, balance: _, amount: _ }
            | LedgerError::InsufficientAllowance {
                owner: _,
                spender: _,
                allowance: _,
                amount: _,
            } => ExitCode::USR_INSUFFICIENT_FUNDS,
            LedgerError::StateInvariant(_) => ExitCode::USR_ILLEGAL_STATE,
            LedgerError::LedgerState(state_error) => match state_error {
                LedgerStateError::IpldHamt(_) | LedgerStateError::Serialization(_) => {
                    ExitCode::USR_SERIALIZATION
                }
                LedgerStateError::MissingState(_) => ExitCode::USR_NOT_FOUND,
                LedgerStateError::NegativeAllowance { amount: _, owner: _, spender: _ } => {
                    ExitCode::USR_ILLEGAL_ARGUMENT
                }
                LedgerStateError::InsufficientBalance { owner: _, balance: _, amount: _ }
                | LedgerStateError::InsufficientAllowance {
                    owner: _,
                    spender: _,
                    allowance: _,
                    amount: _,
                } => ExitCode::USR_INSUFFICIENT_FUNDS,
            },
        }
    }
}
