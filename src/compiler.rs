//! Detects whether a contract was compiled with Solidity or Vyper.
//!
//! The two toolchains differ in how they key storage mappings (see
//! [`crate::storage_key`]), so guessing wrong forces the slot finder to
//! re-probe under the other convention. Sniffing the bytecode first avoids
//! that in the common case.

use serde::{Deserialize, Serialize};

/// A source-language convention, once resolved. Never holds "unknown" — an
/// archive entry either names the real convention or has no compiler at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compiler {
    Solidity,
    Vyper,
}

/// The outcome of sniffing a contract's bytecode: a resolved convention, or
/// `Unknown` when neither toolchain's signature matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    Known(Compiler),
    Unknown,
}

impl Sniff {
    pub fn known(self) -> Option<Compiler> {
        match self {
            Self::Known(compiler) => Some(compiler),
            Self::Unknown => None,
        }
    }
}

/// Vyper prefix signatures, lowercase hex (no `0x`).
const VYPER_PREFIXES: [&str; 2] = ["6004361015", "341561000a"];
/// Solidity prefix signatures, lowercase hex (no `0x`).
const SOLIDITY_PREFIXES: [&str; 2] = ["6060604052", "6080604052"];

/// Sniffs the compiler that produced `bytecode`.
///
/// Checks the CBOR metadata suffix the two toolchains emit first, then falls
/// back to well-known init-code prefixes. Bytecode too short to contain the
/// metadata suffix (e.g. a 45-byte minimal proxy) is simply not matched by
/// the suffix check rather than causing an out-of-range panic, mirroring how
/// the original's negative-index slicing degrades to an empty, non-matching
/// slice on short input.
pub fn sniff(bytecode: &[u8]) -> Sniff {
    let len = bytecode.len();

    if len >= 53 && bytecode[len - 53..len - 51] == [0xA2, 0x64] {
        return Sniff::Known(Compiler::Solidity);
    }
    if len >= 13 && bytecode[len - 13..len - 11] == [0xA1, 0x65] {
        return Sniff::Known(Compiler::Vyper);
    }

    for prefix in VYPER_PREFIXES {
        if starts_with_hex(bytecode, prefix) {
            return Sniff::Known(Compiler::Vyper);
        }
    }
    for prefix in SOLIDITY_PREFIXES {
        if starts_with_hex(bytecode, prefix) {
            return Sniff::Known(Compiler::Solidity);
        }
    }

    Sniff::Unknown
}

fn starts_with_hex(bytecode: &[u8], hex_prefix: &str) -> bool {
    match const_hex_decode(hex_prefix) {
        Some(prefix) => bytecode.starts_with(&prefix),
        None => false,
    }
}

/// Small fixed-size hex decoder for the prefix constants above; avoids
/// pulling in an allocation for a handful of 5-byte signatures.
fn const_hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_solidity_metadata_suffix() {
        let mut bytecode = vec![0u8; 100];
        let len = bytecode.len();
        bytecode[len - 53] = 0xA2;
        bytecode[len - 52] = 0x64;
        assert_eq!(sniff(&bytecode), Sniff::Known(Compiler::Solidity));
    }

    #[test]
    fn sniffs_vyper_metadata_suffix() {
        let mut bytecode = vec![0u8; 100];
        let len = bytecode.len();
        bytecode[len - 13] = 0xA1;
        bytecode[len - 12] = 0x65;
        assert_eq!(sniff(&bytecode), Sniff::Known(Compiler::Vyper));
    }

    #[test]
    fn sniffs_solidity_prefix() {
        let bytecode = const_hex_decode("6080604052600436106100").unwrap();
        assert_eq!(sniff(&bytecode), Sniff::Known(Compiler::Solidity));
    }

    #[test]
    fn sniffs_vyper_prefix() {
        let bytecode = const_hex_decode("6004361015610").unwrap();
        assert_eq!(sniff(&bytecode), Sniff::Known(Compiler::Vyper));
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let bytecode = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(sniff(&bytecode), Sniff::Unknown);
    }

    #[test]
    fn minimal_proxy_bytecode_does_not_panic() {
        // EIP-1167 minimal proxies are ~45 bytes, shorter than the metadata
        // suffix windows this function indexes into.
        let bytecode = vec![0u8; 45];
        assert_eq!(sniff(&bytecode), Sniff::Unknown);
    }

    #[test]
    fn empty_bytecode_does_not_panic() {
        assert_eq!(sniff(&[]), Sniff::Unknown);
    }
}
