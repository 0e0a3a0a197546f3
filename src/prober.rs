//! C7: classifies a token as *simple* or *complex* by simulating
//! `transferFrom` under synthesized balance/allowance overrides.
//!
//! A token is simple when the simulated transfer succeeds given nothing more
//! than a sufficient balance and allowance; complex otherwise — whether
//! because the override didn't reach the real storage layout, or because the
//! token enforces additional conditions (KYC allowlists, pausability,
//! transfer taxes) that no storage override can satisfy.

use {
    crate::{
        chain::{Chain, Erc20, TransferFromOutcome},
        overrides::{synthesize, OVERRIDE_AMOUNT},
        store::TokenRecord,
    },
    alloy::primitives::Address,
};

/// Tokens verified by hand to behave correctly under a simulated
/// `transferFrom` despite the simulation being unable to confirm it through
/// the normal boolean-return check — e.g. `transferFrom` that returns no
/// data at all (USDT) or that enforces an allowlist the override can't
/// satisfy but that the probing spender is already a member of.
pub const FORCED_SIMPLE: [Address; 5] = [
    address(0xdA, 0xC1, 0x7F, 0x95, 0x8D, 0x2e, 0xe5, 0x23, 0xa2, 0x20, 0x62, 0x06, 0x99, 0x45, 0x97, 0xC1, 0x3D, 0x83, 0x1e, 0xc7),
    address(0xF4, 0x33, 0x08, 0x93, 0x66, 0x89, 0x9D, 0x83, 0xa9, 0xf2, 0x6A, 0x77, 0x3D, 0x59, 0xec, 0x7e, 0xCF, 0x30, 0x35, 0x5e),
    address(0xd2, 0x61, 0x14, 0xcd, 0x6E, 0xE2, 0x89, 0xAc, 0xcF, 0x82, 0x35, 0x0c, 0x8d, 0x84, 0x87, 0xfe, 0xdB, 0x8A, 0x0C, 0x07),
    address(0xe3, 0x81, 0x85, 0x04, 0xc1, 0xB3, 0x2b, 0xF1, 0x55, 0x7b, 0x16, 0xC2, 0x38, 0xB2, 0xE0, 0x1f, 0xd3, 0x14, 0x9C, 0x17),
    address(0x37, 0x2d, 0x5d, 0x02, 0xc6, 0xb4, 0x07, 0x5b, 0xd5, 0x88, 0x92, 0xf8, 0x03, 0x00, 0xcA, 0x59, 0x0e, 0x92, 0xd2, 0x9E),
];

const fn address(
    b0: u8,
    b1: u8,
    b2: u8,
    b3: u8,
    b4: u8,
    b5: u8,
    b6: u8,
    b7: u8,
    b8: u8,
    b9: u8,
    b10: u8,
    b11: u8,
    b12: u8,
    b13: u8,
    b14: u8,
    b15: u8,
    b16: u8,
    b17: u8,
    b18: u8,
    b19: u8,
) -> Address {
    Address::new([
        b0, b1, b2, b3, b4, b5, b6, b7, b8, b9, b10, b11, b12, b13, b14, b15, b16, b17, b18, b19,
    ])
}

fn is_forced_simple(token: Address) -> bool {
    FORCED_SIMPLE.contains(&token)
}

/// Runs the simulated `transferFrom(owner, recipient, OVERRIDE_AMOUNT)` under
/// the override document synthesized from `record`, and returns whether the
/// token should be treated as simple.
///
/// `spender` is the account issuing the simulated call (`msg.sender`); it
/// must equal the `spender` the allowance override was synthesized for.
pub async fn classify(
    chain: &dyn Chain,
    token: Address,
    record: &TokenRecord,
    owner: Address,
    recipient: Address,
    spender: Address,
) -> bool {
    if is_forced_simple(token) {
        return true;
    }

    let overrides = synthesize(record, owner, spender);
    let erc20 = Erc20::new(chain);
    let outcome = erc20
        .transfer_from(token, owner, recipient, OVERRIDE_AMOUNT, &overrides)
        .await;

    matches!(outcome, Ok(TransferFromOutcome::Succeeded))
}
