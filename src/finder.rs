//! C5: searches a token contract for the storage slot backing its balance
//! and allowance mappings.
//!
//! The search writes a probe value into a candidate slot's computed mapping
//! key, re-reads the corresponding view function, and restores the original
//! word regardless of outcome — probing never leaves the fork in a different
//! state than it found it. Balance matches are accepted on a strict increase
//! (packed or scaled balance representations mean the raw word written
//! doesn't always equal the value the view function reports); allowance
//! matches require exact equality, since no standard ERC20 scales allowances.

use {
    crate::{
        chain::{Chain, Erc20},
        compiler::{sniff, Compiler},
        error::ChainError,
        primitives::abi_pad_uint,
        storage_key::{mapping_key, nested_mapping_key},
        store::{candidate_schedule, SlotRecord, MAX_SLOT},
    },
    alloy::primitives::{Address, B256, U256},
};

/// Added to the current balance (or used outright as the allowance) when
/// probing a candidate slot: `1000 * 10^18`, large enough not to collide
/// with realistic token amounts (SPEC_FULL.md §4.5.2).
const PROBE_DELTA: U256 = U256::from_limbs([3_875_820_019_684_212_736, 54, 0, 0]);

/// The resolved location and source-language convention of a mapping
/// variable, once found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub record: SlotRecord,
    pub compiler: Compiler,
}

/// Which view function witnesses a balance slot. `VIEW_METHODS[balance]`
/// in SPEC_FULL.md §4.5.3: `balanceOf` is tried first, `principalBalanceOf`
/// second for tokens (Aave aTokens) whose `balanceOf` reports a scaled,
/// non-monotonic value that never strictly increases from a raw slot write.
#[derive(Debug, Clone, Copy)]
enum BalanceView {
    Standard,
    Principal,
}

impl BalanceView {
    async fn read(self, erc20: &Erc20<'_>, token: Address, owner: Address) -> Result<U256, ChainError> {
        match self {
            Self::Standard => erc20.balance_of(token, owner, None).await,
            Self::Principal => erc20.principal_balance_of(token, owner, None).await,
        }
    }
}

pub struct Finder<'a> {
    chain: &'a dyn Chain,
}

impl<'a> Finder<'a> {
    pub fn new(chain: &'a dyn Chain) -> Self {
        Self { chain }
    }

    /// Contracts whose storage might actually hold this token's balances,
    /// most likely first: the token itself, then (if present) a
    /// Synthetix-style external `tokenState()`, then a Gemini-style
    /// `erc20Impl()` → `erc20Store()` double indirection. The view calls
    /// used to *read* values always stay on `token` regardless of which of
    /// these actually ends up holding the slot.
    pub async fn storage_targets(&self, token: Address) -> Vec<Address> {
        let erc20 = Erc20::new(self.chain);
        let mut targets = vec![token];

        if let Ok(state) = erc20.token_state(token).await {
            targets.push(state);
        }
        if let Ok(impl_address) = erc20.erc20_impl(token).await {
            if let Ok(store) = erc20.erc20_store(impl_address).await {
                targets.push(store);
            }
        }

        targets
    }

    /// `None` means the target's code couldn't be fetched at all (a
    /// transport error); the caller skips this target rather than aborting
    /// the whole search (SPEC_FULL.md §7, "debug-log and continue").
    async fn compilers_for(&self, target: Address) -> Option<Vec<Compiler>> {
        let code = match self.chain.code(target).await {
            Ok(code) => code,
            Err(err) => {
                tracing::debug!(?target, ?err, "failed to fetch code for compiler sniffing");
                return None;
            }
        };
        Some(match sniff(&code).known() {
            Some(compiler) => vec![compiler],
            None => vec![Compiler::Solidity, Compiler::Vyper],
        })
    }

    /// Searches for the slot backing `balanceOf(owner)`, falling back to
    /// `principalBalanceOf(owner)` (the unscaled view Aave aTokens expose)
    /// when the standard view never witnesses a slot. `known_slots` seeds
    /// the candidate schedule with slots already resolved for other tokens
    /// in this run, tried first.
    pub async fn find_balance(
        &self,
        token: Address,
        owner: Address,
        known_slots: impl IntoIterator<Item = u32>,
    ) -> Result<Option<Resolved>, ChainError> {
        let schedule = candidate_schedule(known_slots);

        for view in [BalanceView::Standard, BalanceView::Principal] {
            if let Some(resolved) = self.find_balance_via(token, owner, &schedule, view).await? {
                return Ok(Some(resolved));
            }
        }

        Ok(None)
    }

    async fn find_balance_via(
        &self,
        token: Address,
        owner: Address,
        schedule: &[u32],
        view: BalanceView,
    ) -> Result<Option<Resolved>, ChainError> {
        let erc20 = Erc20::new(self.chain);
        let baseline = match view.read(&erc20, token, owner).await {
            Ok(value) => value,
            Err(ChainError::CallReverted { .. } | ChainError::Undecodable { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        for target in self.storage_targets(token).await {
            let Some(compilers) = self.compilers_for(target).await else {
                continue;
            };
            for compiler in compilers {
                for &slot in schedule {
                    let key = mapping_key(U256::from(slot), owner, compiler);
                    match self
                        .probe_balance_slot(&erc20, token, target, key, owner, baseline, view)
                        .await
                    {
                        Ok(true) => {
                            return Ok(Some(Resolved {
                                record: SlotRecord {
                                    slot: Some(slot),
                                    target: Some(target.into()),
                                },
                                compiler,
                            }))
                        }
                        Ok(false) => continue,
                        Err(err) => {
                            tracing::debug!(?token, ?target, slot, ?err, "balance slot probe failed");
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    /// Writes the probe delta into `key`, re-reads the balance view, restores
    /// the original word, and reports whether the view strictly increased.
    /// Every fallible step here is a single candidate slot's worth of work:
    /// callers absorb the error and move to the next slot rather than
    /// treating it as fatal for the whole search.
    async fn probe_balance_slot(
        &self,
        erc20: &Erc20<'_>,
        token: Address,
        target: Address,
        key: B256,
        owner: Address,
        baseline: U256,
        view: BalanceView,
    ) -> Result<bool, ChainError> {
        let original = self.chain.storage_get(target, key).await?;
        let probe = abi_pad_uint(baseline.saturating_add(PROBE_DELTA));
        self.chain.storage_set(target, key, probe).await?;

        let observed = view.read(erc20, token, owner).await;

        self.chain.storage_set(target, key, original).await?;

        Ok(matches!(observed, Ok(value) if value > baseline))
    }

    /// Searches for the slot backing `allowance(owner, spender)`.
    pub async fn find_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        known_slots: impl IntoIterator<Item = u32>,
    ) -> Result<Option<Resolved>, ChainError> {
        let erc20 = Erc20::new(self.chain);
        let schedule = candidate_schedule(known_slots);
        let starting = match erc20.allowance(token, owner, spender, None).await {
            Ok(value) => value,
            Err(ChainError::CallReverted { .. } | ChainError::Undecodable { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };

        for target in self.storage_targets(token).await {
            let Some(compilers) = self.compilers_for(target).await else {
                continue;
            };
            for compiler in compilers {
                for &slot in &schedule {
                    let key = nested_mapping_key(U256::from(slot), owner, spender, compiler);
                    match self
                        .probe_allowance_slot(&erc20, token, target, key, owner, spender, starting)
                        .await
                    {
                        Ok(true) => {
                            return Ok(Some(Resolved {
                                record: SlotRecord {
                                    slot: Some(slot),
                                    target: Some(target.into()),
                                },
                                compiler,
                            }))
                        }
                        Ok(false) => continue,
                        Err(err) => {
                            tracing::debug!(?token, ?target, slot, ?err, "allowance slot probe failed");
                            continue;
                        }
                    }
                }
            }
        }

        Ok(None)
    }

    async fn probe_allowance_slot(
        &self,
        erc20: &Erc20<'_>,
        token: Address,
        target: Address,
        key: B256,
        owner: Address,
        spender: Address,
        starting: U256,
    ) -> Result<bool, ChainError> {
        let original = self.chain.storage_get(target, key).await?;
        let probe = starting.saturating_add(PROBE_DELTA);
        self.chain.storage_set(target, key, abi_pad_uint(probe)).await?;

        let observed = erc20.allowance(token, owner, spender, None).await;

        self.chain.storage_set(target, key, original).await?;

        Ok(matches!(observed, Ok(value) if value == probe))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::chain::fake::{FakeChain, FakeContract},
    };

    #[tokio::test]
    async fn finds_balance_slot_on_a_plain_solidity_token() {
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xAA);
        chain.insert(token, FakeContract::new(Compiler::Solidity, 7, 9));

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        let resolved = finder.find_balance(token, owner, []).await.unwrap().unwrap();

        assert_eq!(resolved.record.slot, Some(7));
        assert_eq!(resolved.compiler, Compiler::Solidity);
        assert_eq!(resolved.record.target, Some(token.into()));
    }

    #[tokio::test]
    async fn falls_back_to_principal_balance_of_when_balance_of_reverts() {
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xA1);
        let mut contract = FakeContract::new(Compiler::Solidity, 4, 0);
        contract.balance_of_reverts = true;
        chain.insert(token, contract);

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        let resolved = finder.find_balance(token, owner, []).await.unwrap().unwrap();

        assert_eq!(resolved.record.slot, Some(4));
    }

    #[tokio::test]
    async fn finds_balance_slot_on_a_vyper_token_without_guessing_wrong() {
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xBB);
        chain.insert(token, FakeContract::new(Compiler::Vyper, 2, 4));

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        let resolved = finder.find_balance(token, owner, []).await.unwrap().unwrap();

        assert_eq!(resolved.record.slot, Some(2));
        assert_eq!(resolved.compiler, Compiler::Vyper);
    }

    #[tokio::test]
    async fn finds_allowance_slot_with_exact_match() {
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xCC);
        chain.insert(token, FakeContract::new(Compiler::Solidity, 0, 11));

        let owner = Address::repeat_byte(0x01);
        let spender = Address::repeat_byte(0x02);
        let finder = Finder::new(&chain);
        let resolved = finder
            .find_allowance(token, owner, spender, [])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(resolved.record.slot, Some(11));
    }

    #[tokio::test]
    async fn known_slots_are_tried_before_the_rest_of_the_sweep() {
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xDD);
        chain.insert(token, FakeContract::new(Compiler::Solidity, 250, 0));

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        // Without a hint this would still be found by the full 0..MAX_SLOT
        // sweep; seeding it as a known slot just moves it to the front.
        let resolved = finder.find_balance(token, owner, [250]).await.unwrap().unwrap();
        assert_eq!(resolved.record.slot, Some(250));
    }

    #[tokio::test]
    async fn unresolvable_token_returns_none_without_erroring() {
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xFA);
        // Slot is out of MAX_SLOT range: never found by the sweep.
        chain.insert(token, FakeContract::new(Compiler::Solidity, MAX_SLOT + 1, 0));

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        assert_eq!(finder.find_balance(token, owner, []).await.unwrap(), None);
    }

    #[tokio::test]
    async fn synthetix_style_token_state_proxy_resolves_at_the_external_store() {
        // S3: a token whose own storage holds nothing; `balanceOf` actually
        // reads from a separate contract named by `tokenState()`.
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xE1);
        let token_state = Address::repeat_byte(0xE2);

        let mut token_contract = FakeContract::new(Compiler::Solidity, 6, 0);
        token_contract.storage_holder = Some(token_state);
        token_contract.token_state = Some(token_state);
        chain.insert(token, token_contract);

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        let resolved = finder.find_balance(token, owner, []).await.unwrap().unwrap();

        assert_eq!(resolved.record.slot, Some(6));
        assert_eq!(resolved.record.target, Some(token_state.into()));
    }

    #[tokio::test]
    async fn gemini_style_two_level_proxy_resolves_at_the_final_store() {
        // S4: `erc20Impl()` names a second contract whose own `erc20Store()`
        // names the contract that actually holds the balance slot.
        let chain = FakeChain::new();
        let token = Address::repeat_byte(0xF1);
        let impl_address = Address::repeat_byte(0xF2);
        let store_address = Address::repeat_byte(0xF3);

        let mut token_contract = FakeContract::new(Compiler::Solidity, 9, 0);
        token_contract.storage_holder = Some(store_address);
        token_contract.erc20_impl = Some(impl_address);
        chain.insert(token, token_contract);

        let mut impl_contract = FakeContract::new(Compiler::Solidity, 9, 0);
        impl_contract.erc20_store = Some(store_address);
        chain.insert(impl_address, impl_contract);

        let owner = Address::repeat_byte(0x01);
        let finder = Finder::new(&chain);
        let resolved = finder.find_balance(token, owner, []).await.unwrap().unwrap();

        assert_eq!(resolved.record.slot, Some(9));
        assert_eq!(resolved.record.target, Some(store_address.into()));
    }
}
