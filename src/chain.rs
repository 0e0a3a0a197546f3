//! C1: a typed wrapper over the forked node.
//!
//! Exposes the handful of JSON-RPC operations the rest of the system needs —
//! reading code and storage, writing a single storage slot, and issuing view
//! calls with optional per-call state overrides — plus small ERC20-flavored
//! helpers built on top of them. Everything here is async; these are the only
//! suspension points in the system (see `SPEC_FULL.md` §5).

use {
    crate::{error::ChainError, overrides::OverrideDocument, primitives::keccak},
    alloy::{
        primitives::{Address, Bytes, B256, U256},
        providers::{DynProvider, Provider, ProviderBuilder},
        rpc::types::{
            state::{AccountOverride, StateOverride},
            TransactionRequest,
        },
    },
    async_trait::async_trait,
    std::time::Duration,
    url::Url,
};

/// The per-request deadline the forked node is expected to honor: generous,
/// since the slot search can issue tens of thousands of requests against a
/// single fork over the course of a run. Enforced node-side by the fork
/// simulator's own RPC timeout configuration, not by this client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 2);

/// The outcome of decoding a contract's return data as the expected type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFromOutcome {
    Succeeded,
    Failed,
    /// The call produced output that isn't a single ABI-encoded `bool` —
    /// typically a `transferFrom` that returns nothing at all (USDT-style).
    Undecodable,
}

/// Low-level chain access. Implemented for real use by [`AlloyChain`] and, in
/// tests, by hand-written fakes that model a single contract's storage and
/// view-function behavior.
#[async_trait]
pub trait Chain: Send + Sync {
    async fn code(&self, address: Address) -> Result<Bytes, ChainError>;

    async fn storage_get(&self, address: Address, key: B256) -> Result<B256, ChainError>;

    /// Writes a single 32-byte slot. Returns the node's own success flag;
    /// `false` surfaces as [`ChainError::SimulatorRejected`].
    async fn storage_set(&self, address: Address, key: B256, value: B256) -> Result<(), ChainError>;

    /// Issues a view call, applying `overrides` for the call's duration
    /// only. `sender` sets `msg.sender` for the call (`None` leaves it at
    /// the node's default); every caller except [`Erc20::transfer_from`]
    /// passes `None`, since only `transferFrom` depends on who is calling.
    async fn call(
        &self,
        address: Address,
        calldata: Bytes,
        sender: Option<Address>,
        overrides: Option<&OverrideDocument>,
    ) -> Result<Bytes, ChainError>;
}

/// A view call bound to a specific contract and function signature; computes
/// its own 4-byte selector from the signature so call sites never hand-encode
/// one.
struct ViewCall {
    signature: &'static str,
    args: Vec<B256>,
}

impl ViewCall {
    fn new(signature: &'static str, args: Vec<B256>) -> Self {
        Self { signature, args }
    }

    fn calldata(&self) -> Bytes {
        let selector = &keccak(self.signature.as_bytes())[..4];
        let mut data = Vec::with_capacity(4 + self.args.len() * 32);
        data.extend_from_slice(selector);
        for word in &self.args {
            data.extend_from_slice(word.as_slice());
        }
        Bytes::from(data)
    }
}

fn decode_u256(data: &[u8]) -> Option<U256> {
    (data.len() >= 32).then(|| U256::from_be_slice(&data[..32]))
}

fn decode_address(data: &[u8]) -> Option<Address> {
    (data.len() >= 32).then(|| Address::from_slice(&data[12..32]))
}

/// Decodes a dynamic ABI `string` return value: a 32-byte head holding the
/// offset to the tail, then a 32-byte length, then the UTF-8 bytes
/// themselves. Returns `None` on anything malformed rather than erroring —
/// `symbol()` is cosmetic, never load-bearing for the slot search.
fn decode_string(data: &[u8]) -> Option<String> {
    let offset: u64 = decode_u256(data.get(..32)?)?.try_into().ok()?;
    let offset = offset as usize;
    let len_word = data.get(offset..offset + 32)?;
    let len: u64 = decode_u256(len_word)?.try_into().ok()?;
    let len = len as usize;
    let bytes = data.get(offset + 32..offset + 32 + len)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Everything the rest of the system calls on an ERC20-shaped contract,
/// built on top of the raw [`Chain::call`].
pub struct Erc20<'a> {
    chain: &'a dyn Chain,
}

impl<'a> Erc20<'a> {
    pub fn new(chain: &'a dyn Chain) -> Self {
        Self { chain }
    }

    async fn view_u256(
        &self,
        target: Address,
        call: ViewCall,
        overrides: Option<&OverrideDocument>,
    ) -> Result<U256, ChainError> {
        let function = call.signature.to_string();
        let data = self.chain.call(target, call.calldata(), None, overrides).await?;
        decode_u256(&data).ok_or(ChainError::Undecodable {
            address: target,
            function,
        })
    }

    async fn view_address(&self, target: Address, call: ViewCall) -> Result<Address, ChainError> {
        let function = call.signature.to_string();
        let data = self.chain.call(target, call.calldata(), None, None).await?;
        decode_address(&data).ok_or(ChainError::Undecodable {
            address: target,
            function,
        })
    }

    pub async fn balance_of(
        &self,
        target: Address,
        owner: Address,
        overrides: Option<&OverrideDocument>,
    ) -> Result<U256, ChainError> {
        let call = ViewCall::new("balanceOf(address)", vec![pad(owner)]);
        self.view_u256(target, call, overrides).await
    }

    pub async fn principal_balance_of(
        &self,
        target: Address,
        owner: Address,
        overrides: Option<&OverrideDocument>,
    ) -> Result<U256, ChainError> {
        let call = ViewCall::new("principalBalanceOf(address)", vec![pad(owner)]);
        self.view_u256(target, call, overrides).await
    }

    pub async fn allowance(
        &self,
        target: Address,
        owner: Address,
        spender: Address,
        overrides: Option<&OverrideDocument>,
    ) -> Result<U256, ChainError> {
        let call = ViewCall::new("allowance(address,address)", vec![pad(owner), pad(spender)]);
        self.view_u256(target, call, overrides).await
    }

    pub async fn token_state(&self, target: Address) -> Result<Address, ChainError> {
        self.view_address(target, ViewCall::new("tokenState()", vec![]))
            .await
    }

    pub async fn erc20_impl(&self, target: Address) -> Result<Address, ChainError> {
        self.view_address(target, ViewCall::new("erc20Impl()", vec![]))
            .await
    }

    pub async fn erc20_store(&self, target: Address) -> Result<Address, ChainError> {
        self.view_address(target, ViewCall::new("erc20Store()", vec![]))
            .await
    }

    /// Best-effort `symbol()` lookup. `None` on any failure to call or
    /// decode — missing a symbol never blocks the slot search.
    pub async fn symbol(&self, target: Address) -> Option<String> {
        let call = ViewCall::new("symbol()", vec![]);
        let data = self.chain.call(target, call.calldata(), None, None).await.ok()?;
        decode_string(&data)
    }

    /// Simulates `transferFrom(from, to, amount)` with `msg.sender = to`
    /// (SPEC_FULL.md §4.7) under the given overrides.
    pub async fn transfer_from(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
        overrides: &OverrideDocument,
    ) -> Result<TransferFromOutcome, ChainError> {
        let call = ViewCall::new(
            "transferFrom(address,address,uint256)",
            vec![pad(from), pad(to), crate::primitives::abi_pad_uint(amount)],
        );
        match self.chain.call(token, call.calldata(), Some(to), Some(overrides)).await {
            Ok(data) if data.is_empty() => Ok(TransferFromOutcome::Undecodable),
            Ok(data) => match decode_u256(&data) {
                Some(value) => Ok(if value.is_zero() {
                    TransferFromOutcome::Failed
                } else {
                    TransferFromOutcome::Succeeded
                }),
                None => Ok(TransferFromOutcome::Undecodable),
            },
            Err(ChainError::CallReverted { .. }) => Ok(TransferFromOutcome::Failed),
            Err(err) => Err(err),
        }
    }
}

fn pad(address: Address) -> B256 {
    crate::primitives::abi_pad_addr(address)
}

/// Real chain client, backed by an `alloy` JSON-RPC provider over HTTP.
pub struct AlloyChain {
    provider: DynProvider,
}

impl AlloyChain {
    pub fn connect(rpc_url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url);
        Self {
            provider: DynProvider::new(provider),
        }
    }

    fn to_state_override(doc: &OverrideDocument) -> StateOverride {
        doc.iter()
            .map(|(address, state_diff)| {
                let account_override = AccountOverride {
                    state_diff: Some(state_diff.clone()),
                    ..Default::default()
                };
                (*address, account_override)
            })
            .collect()
    }
}

#[async_trait]
impl Chain for AlloyChain {
    async fn code(&self, address: Address) -> Result<Bytes, ChainError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn storage_get(&self, address: Address, key: B256) -> Result<B256, ChainError> {
        let value = self
            .provider
            .get_storage_at(address, U256::from_be_bytes(key.0))
            .await?;
        Ok(B256::from(value.to_be_bytes()))
    }

    async fn storage_set(&self, address: Address, key: B256, value: B256) -> Result<(), ChainError> {
        let success: bool = self
            .provider
            .raw_request("evm_setAccountStorageAt".into(), (address, key, value))
            .await?;
        if success {
            Ok(())
        } else {
            Err(ChainError::SimulatorRejected {
                address,
                key: key.to_string(),
            })
        }
    }

    async fn call(
        &self,
        address: Address,
        calldata: Bytes,
        sender: Option<Address>,
        overrides: Option<&OverrideDocument>,
    ) -> Result<Bytes, ChainError> {
        let mut tx = TransactionRequest::default().to(address).input(calldata.into());
        if let Some(sender) = sender {
            tx = tx.from(sender);
        }
        let call = self.provider.call(tx);
        let result = match overrides {
            Some(doc) => call.overrides(Self::to_state_override(doc)).await,
            None => call.await,
        };
        result.map_err(|err| {
            // Any revert/exception raised by the simulator while servicing a
            // view call is terminal for the (token, variable) search: the
            // target simply cannot answer this function.
            ChainError::CallReverted {
                address,
                function: "eth_call".to_string(),
                message: err.to_string(),
            }
        })
    }
}
