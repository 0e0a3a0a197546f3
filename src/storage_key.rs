//! Mapping storage key derivation, shared by the slot finder and the
//! override synthesizer so the two can never drift apart on the hashing
//! convention.

use {
    crate::{
        compiler::Compiler,
        primitives::{abi_pad_addr, abi_pad_uint, keccak},
    },
    alloy::primitives::{Address, B256, U256},
};

/// Computes the storage key for `mapping(address => ...)[account]` located at
/// `slot`, under the given source-language convention.
///
/// Solidity keys as `keccak(pad(account) ‖ pad(slot))`; Vyper keys as
/// `keccak(pad(slot) ‖ pad(account))`. Swapping the order is exactly the bug
/// that makes a Vyper token's slot search fail under the Solidity
/// convention and vice versa.
pub fn mapping_key(slot: U256, account: Address, compiler: Compiler) -> B256 {
    let slot_word = abi_pad_uint(slot);
    let account_word = abi_pad_addr(account);
    match compiler {
        Compiler::Solidity => keccak(&concat(account_word, slot_word)),
        Compiler::Vyper => keccak(&concat(slot_word, account_word)),
    }
}

/// Computes the storage key for the nested `mapping(address => mapping(address
/// => ...))[owner][spender]` allowance layout at `slot`.
///
/// The outer key is `mapping_key(slot, owner, compiler)`; the inner key
/// re-applies the same hashing order, keying on `spender` instead of an
/// `address`-typed account and on the outer key instead of a `uint256` slot
/// word (the two inputs are both already 32-byte words, so the same byte
/// layout applies).
pub fn nested_mapping_key(slot: U256, owner: Address, spender: Address, compiler: Compiler) -> B256 {
    let outer = mapping_key(slot, owner, compiler);
    let spender_word = abi_pad_addr(spender);
    match compiler {
        Compiler::Solidity => keccak(&concat(spender_word, outer)),
        Compiler::Vyper => keccak(&concat(outer, spender_word)),
    }
}

fn concat(a: B256, b: B256) -> [u8; 64] {
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(a.as_slice());
    out[32..].copy_from_slice(b.as_slice());
    out
}
