//! C6: synthesizes `eth_call` state-override documents that make a token
//! contract believe a given account holds a balance and allowance it doesn't
//! actually have.
//!
//! An override document is a plain mapping from the contract whose storage is
//! being patched to the set of slot writes to apply for the duration of a
//! single call — never persisted, never applied via `storage_set`.

use {
    crate::{
        compiler::Compiler,
        primitives::abi_pad_uint,
        storage_key::{mapping_key, nested_mapping_key},
        store::TokenRecord,
    },
    alloy::primitives::{Address, B256, U256},
    std::collections::HashMap,
};

/// An amount comfortably larger than any real balance or allowance, used so
/// the synthesized funds are never mistaken for the token's actual total
/// supply. One less than 2^95 avoids overflowing signed accounting internal
/// to some tokens (e.g. Aave's scaled balances) that store amounts alongside
/// a sign or index bit in adjacent bits of the same slot.
pub const OVERRIDE_AMOUNT: U256 = U256::from_limbs([u64::MAX, 0x7FFF_FFFF, 0, 0]);

/// `contract -> (slot -> value)`. Mirrors the shape Ethereum JSON-RPC expects
/// for a call's `stateDiff` overrides.
pub type OverrideDocument = HashMap<Address, HashMap<B256, B256>>;

fn entry<'a>(doc: &'a mut OverrideDocument, contract: Address) -> &'a mut HashMap<B256, B256> {
    doc.entry(contract).or_default()
}

/// Builds the override document that makes `owner` appear to hold at least
/// [`OVERRIDE_AMOUNT`] of `token`'s balance, and to have granted `spender` an
/// allowance of at least [`OVERRIDE_AMOUNT`] over it.
///
/// Either half is omitted when the corresponding slot hasn't been resolved in
/// `record` — an empty document for a fully-unresolved token is valid and
/// simply makes the subsequent `transferFrom` simulation behave as if no
/// override had been requested at all.
pub fn synthesize(record: &TokenRecord, owner: Address, spender: Address) -> OverrideDocument {
    let mut doc = OverrideDocument::new();

    if let (Some(slot), Some(target), Some(compiler)) =
        (record.balance.slot, record.balance.target, record.compiler)
    {
        let key = mapping_key(U256::from(slot), owner, compiler);
        entry(&mut doc, target.into()).insert(key, abi_pad_uint(OVERRIDE_AMOUNT));
    }

    if let (Some(slot), Some(target), Some(compiler)) =
        (record.allowance.slot, record.allowance.target, record.compiler)
    {
        let key = nested_mapping_key(U256::from(slot), owner, spender, compiler);
        entry(&mut doc, target.into()).insert(key, abi_pad_uint(OVERRIDE_AMOUNT));
    }

    doc
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::store::{SlotRecord, TokenRecord},
    };

    fn resolved_record(target: Address) -> TokenRecord {
        TokenRecord {
            balance: SlotRecord {
                slot: Some(3),
                target: Some(target.into()),
            },
            allowance: SlotRecord {
                slot: Some(5),
                target: Some(target.into()),
            },
            compiler: Some(Compiler::Solidity),
            symbol: None,
            complex: None,
        }
    }

    #[test]
    fn unresolved_token_yields_empty_document() {
        let record = TokenRecord::default();
        let doc = synthesize(&record, Address::repeat_byte(1), Address::repeat_byte(2));
        assert!(doc.is_empty());
    }

    #[test]
    fn resolved_token_writes_one_slot_per_contract() {
        let target = Address::repeat_byte(0x42);
        let record = resolved_record(target);
        let doc = synthesize(&record, Address::repeat_byte(1), Address::repeat_byte(2));
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get(&target).unwrap().len(), 2);
    }
}
