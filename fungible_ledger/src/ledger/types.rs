use fvm_ipld_encoding::tuple::*;
use fvm_shared::econ::TokenAmount;

/// Immutable display information of a ledger
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    /// Power of ten between a whole token and the smallest indivisible unit
    pub decimals: u8,
}

/// Return value after a successful transfer
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferReturn {
    /// The new balance of the `from` address
    pub from_balance: TokenAmount,
    /// The new balance of the `to` address
    pub to_balance: TokenAmount,
}

/// Return value after a successful approval
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct ApproveReturn {
    /// The allowance that was replaced
    pub previous_allowance: TokenAmount,
    /// The allowance now in force
    pub allowance: TokenAmount,
}

/// Return value after a successful delegated transfer
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferFromReturn {
    /// The new balance of the `from` address
    pub from_balance: TokenAmount,
    /// The new balance of the `to` address
    pub to_balance: TokenAmount,
    /// The remaining allowance between `from` and the spender (caller)
    pub allowance: TokenAmount,
}
