//! Finds the storage slots backing ERC20 balance and allowance mappings
//! across a list of tokens, and probes which of those tokens still pass a
//! simulated `transferFrom` once that storage is synthetically overridden.
//!
//! See `SPEC_FULL.md` for the full design; [`run`] is the entry point the
//! binary target calls after parsing [`cli::Arguments`].

pub mod chain;
pub mod cli;
pub mod compiler;
pub mod driver;
pub mod error;
pub mod finder;
pub mod metrics;
pub mod overrides;
pub mod primitives;
pub mod prober;
pub mod sources;
pub mod storage_key;
pub mod store;
pub mod tracing_setup;

use {
    alloy::primitives::Address,
    anyhow::Context,
    chain::AlloyChain,
    cli::Arguments,
    clap::Parser,
    driver::Driver,
    metrics::Metrics,
    sources::{HolderList, TokenList, TokenMetadata},
    std::{collections::HashMap, sync::Arc},
    store::Archive,
};

/// Parses arguments from the process environment and runs to completion.
pub async fn start(args: impl Iterator<Item = String>) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Arguments::parse_from(args);
    tracing_setup::initialize(None);
    run(args).await
}

/// Runs one full pass: fetches the token and holder lists, resolves storage
/// slots, simulates `transferFrom` for every token, and persists the archive.
pub async fn run(args: Arguments) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new());
    let metrics_server = metrics::serve(metrics.clone(), args.metrics_addr);

    let chain = AlloyChain::connect(args.node_url.clone());
    let mut archive = Archive::load(&args.archive_path)
        .with_context(|| format!("loading archive at {}", args.archive_path.display()))?;

    // `skip_search` means: don't touch the network at all, operate on
    // whatever the archive already knows (SPEC_FULL.md §6, driver flags).
    //
    // A failed token-list fetch is a transport error, not an assertion
    // failure (SPEC_FULL.md §7): it is logged and the run falls back to the
    // tokens already on file rather than aborting, so the only way this
    // process exits nonzero is an archive read/write failure (§6, "Exit
    // status").
    let (mut tokens, metadata_by_token, holders_by_token) = if args.skip_search {
        (archive.tokens().collect::<Vec<_>>(), HashMap::new(), HashMap::new())
    } else {
        let http = reqwest::Client::new();
        let token_list = TokenList::new(http.clone(), args.token_list_url.clone());
        let holder_list = HolderList::new(http, args.holder_list_url.clone());

        match token_list.fetch().await {
            Ok(metadata_by_token) => {
                let tokens: Vec<Address> = metadata_by_token.keys().copied().collect();
                tracing::info!(count = tokens.len(), "fetched token list");

                let mut holders_by_token = HashMap::new();
                for &token in &tokens {
                    match holder_list.fetch(token).await {
                        Ok(holders) => {
                            holders_by_token.insert(token, holders);
                        }
                        Err(err) => tracing::warn!(?token, ?err, "failed to fetch holder list"),
                    }
                }
                (tokens, metadata_by_token, holders_by_token)
            }
            Err(err) => {
                tracing::warn!(?err, "failed to fetch token list, falling back to the archive");
                (archive.tokens().collect::<Vec<_>>(), HashMap::new(), HashMap::new())
            }
        }
    };

    if args.delta_only {
        tokens.retain(|&token| !archive.get(token).fully_resolved());
    }

    let driver = Driver::new(&chain, metrics.clone());

    if !args.skip_search {
        driver
            .run_search(
                &mut archive,
                &tokens,
                |token| holders_by_token.get(&token).cloned().unwrap_or_default(),
                |token| {
                    metadata_by_token
                        .get(&token)
                        .and_then(|metadata: &TokenMetadata| metadata.symbol.clone())
                },
                args.spender,
                args.batch_size,
            )
            .await
            .context("slot search phase")?;
    }

    driver
        .run_simulate(&mut archive, &tokens, args.spender, args.force_sim)
        .await
        .context("transferFrom simulation phase")?;

    metrics_server.abort();
    Ok(())
}
