//! A1: command-line / environment configuration.

use {
    alloy::primitives::Address,
    clap::Parser,
    std::net::SocketAddr,
    url::Url,
};

/// The default account used as the simulated `transferFrom` spender when no
/// override is given. Arbitrary but fixed, so archive entries produced by
/// different runs stay comparable.
pub fn default_spender() -> Address {
    "0x7C8E77390e999DA2f826305844078B88DC39aB82"
        .parse()
        .expect("default spender address is valid")
}

#[derive(Debug, Clone, Parser)]
#[clap(version, about = "Finds ERC20 balance/allowance storage slots and probes transferFrom overrides")]
pub struct Arguments {
    /// JSON-RPC endpoint of the forked node used for storage probing and
    /// simulation.
    #[clap(long, env = "RPC_URL_FORK")]
    pub node_url: Url,

    /// URL serving the flat JSON object of token metadata to process.
    #[clap(long, env = "TOKEN_LIST_URL")]
    pub token_list_url: Url,

    /// URL serving the flat JSON object mapping token address to holder
    /// addresses.
    #[clap(long, env = "TOKEN_HOLDERS_URL")]
    pub holder_list_url: Url,

    /// Path to the JSON archive of previously resolved slots.
    #[clap(long, env, default_value = "db/storage_finder_db.json")]
    pub archive_path: std::path::PathBuf,

    /// Number of tokens processed per batch before the archive is persisted.
    #[clap(long, env, default_value_t = 30)]
    pub batch_size: usize,

    /// Account used as `msg.sender` for the simulated `transferFrom` call.
    #[clap(long, env, default_value_t = default_spender())]
    pub spender: Address,

    /// Skip the slot-search phase and only run simulation against the
    /// existing archive.
    #[clap(long, env)]
    pub skip_search: bool,

    /// Re-run the simulation phase even for tokens already classified.
    #[clap(long, env)]
    pub force_sim: bool,

    /// Only process tokens not already present in the archive.
    #[clap(long, env)]
    pub delta_only: bool,

    /// Address the metrics HTTP server binds to.
    #[clap(long, env, default_value = "0.0.0.0:9090")]
    pub metrics_addr: SocketAddr,
}
