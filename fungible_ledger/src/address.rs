use fvm_shared::address::{Address, Payload};
use fvm_shared::ActorID;

/// Namespace of the Ethereum Address Manager, under which Ethereum-style addresses are delegated
pub const EAM_NAMESPACE: ActorID = 10;

/// Length of an Ethereum-style subaddress
pub const ETH_ADDRESS_LEN: usize = 20;

/// Reserved sentinel meaning "no address"
///
/// Transfers to it and approvals for it are always rejected.
pub const NULL_ADDRESS: Address = Address::new_id(0);

/// Returns true if the address is the null sentinel
///
/// Both [`NULL_ADDRESS`] and the all-zero Ethereum address (delegated under the EAM namespace)
/// are treated as null.
pub fn is_null_address(address: &Address) -> bool {
    match address.payload() {
        Payload::ID(id) => *id == 0,
        Payload::Delegated(delegated) => {
            delegated.namespace() == EAM_NAMESPACE
                && delegated.subaddress().len() == ETH_ADDRESS_LEN
                && delegated.subaddress().iter().all(|b| *b == 0)
        }
        _ => false,
    }
}
