use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;

/// Emitted when value moves between accounts, by either `transfer` or `transfer_from`
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: TokenAmount,
}

/// Emitted when an owner sets the allowance of a spender
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct ApprovalEvent {
    pub owner: Address,
    pub spender: Address,
    pub value: TokenAmount,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum LedgerEvent {
    Transfer(TransferEvent),
    Approval(ApprovalEvent),
}

/// Append-only record of the notifications produced by successful mutations
///
/// An event's sequence number is its position in the log.
#[derive(Default, Clone, Debug)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, event: LedgerEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    /// All events, oldest first
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, seq: usize) -> Option<&LedgerEvent> {
        self.events.get(seq)
    }

    pub fn transfers(&self) -> impl Iterator<Item = &TransferEvent> {
        self.events.iter().filter_map(|event| match event {
            LedgerEvent::Transfer(transfer) => Some(transfer),
            LedgerEvent::Approval(_) => None,
        })
    }

    pub fn approvals(&self) -> impl Iterator<Item = &ApprovalEvent> {
        self.events.iter().filter_map(|event| match event {
            LedgerEvent::Approval(approval) => Some(approval),
            LedgerEvent::Transfer(_) => None,
        })
    }

    /// The most recent `Transfer` notification, if any
    pub fn last_transfer(&self) -> Option<&TransferEvent> {
        self.transfers().last()
    }

    /// The most recent `Approval` notification, if any
    pub fn last_approval(&self) -> Option<&ApprovalEvent> {
        self.approvals().last()
    }
}

#[cfg(test)]
mod test {
    use fvm_shared::address::Address;
    use fvm_shared::econ::TokenAmount;

    use super::{ApprovalEvent, EventLog, LedgerEvent, TransferEvent};

    const ALICE: &Address = &Address::new_id(3);
    const BOB: &Address = &Address::new_id(4);

    #[test]
    fn it_filters_events_by_kind() {
        let mut log = EventLog::new();
        assert!(log.is_empty());
        assert!(log.last_transfer().is_none());

        let first = TransferEvent { from: *ALICE, to: *BOB, value: TokenAmount::from_atto(1) };
        let approval =
            ApprovalEvent { owner: *ALICE, spender: *BOB, value: TokenAmount::from_atto(5) };
        let second = TransferEvent { from: *BOB, to: *ALICE, value: TokenAmount::from_atto(2) };

        assert_eq!(log.push(LedgerEvent::Transfer(first.clone())), 0);
        assert_eq!(log.push(LedgerEvent::Approval(approval.clone())), 1);
        assert_eq!(log.push(LedgerEvent::Transfer(second.clone())), 2);

        assert_eq!(log.len(), 3);
        assert_eq!(log.last_transfer(), Some(&second));
        assert_eq!(log.last_approval(), Some(&approval));
        assert_eq!(log.transfers().collect::<Vec<_>>(), vec![&first, &second]);
        assert_eq!(log.get(1), Some(&LedgerEvent::Approval(approval)));
        assert_eq!(log.get(3), None);
    }
}
