//! A fungible token ledger.
//!
//! A single account book records how many units each address holds, alongside a book of
//! allowances through which an owner lets a spender move funds on its behalf. State lives in
//! HAMTs on an IPLD blockstore and every successful mutation appends one notification to the
//! ledger's event log.

pub mod address;
pub mod config;
pub mod ledger;
pub mod shared;

pub use address::{is_null_address, NULL_ADDRESS};
pub use config::{ConfigError, LedgerConfig};
pub use ledger::events::{ApprovalEvent, EventLog, LedgerEvent, TransferEvent};
pub use ledger::types::{ApproveReturn, TokenMetadata, TransferFromReturn, TransferReturn};
pub use ledger::{Ledger, LedgerError, DECIMALS, TOKEN_PRECISION};
pub use shared::SharedLedger;
