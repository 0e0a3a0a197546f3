//! A4: thin HTTP fetchers for the token list and holder list the driver
//! consumes. Re-specifying how these lists are produced is out of scope;
//! this module only has to get the bytes and parse them into the shapes
//! `SPEC_FULL.md` §6 documents.

use {
    alloy::primitives::Address,
    serde::Deserialize,
    std::{collections::HashMap, str::FromStr, time::Duration},
    url::Url,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to fetch {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to parse response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// The metadata attached to one token-list entry. `decimals` and `symbol`
/// are carried through to the archive; `name` is accepted but unused.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenMetadata {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// Fetches the token list: a flat JSON object keyed by (possibly
/// unchecksummed) address, `{address: {name, symbol, decimals}}`. Keys that
/// don't start with `0x` are ignored rather than treated as a parse error —
/// the upstream document is free-form and may carry non-address keys.
pub struct TokenList {
    client: reqwest::Client,
    url: Url,
}

impl TokenList {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    pub async fn fetch(&self) -> Result<HashMap<Address, TokenMetadata>, SourceError> {
        let response = self
            .client
            .get(self.url.clone())
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: self.url.to_string(),
                source,
            })?;
        let body: HashMap<String, TokenMetadata> = response.json().await.map_err(|source| SourceError::Parse {
            url: self.url.to_string(),
            source,
        })?;

        let mut tokens = HashMap::with_capacity(body.len());
        for (key, metadata) in body {
            if !key.starts_with("0x") && !key.starts_with("0X") {
                continue;
            }
            if let Ok(address) = Address::from_str(&key) {
                tokens.insert(address, metadata);
            }
        }
        Ok(tokens)
    }
}

/// Fetches the holder list: a single JSON object `{address: [holder, …]}`
/// covering every token, keyed the same way as the token list. Holder
/// entries need not be checksummed; callers re-checksum on use via
/// [`alloy::primitives::Address`]'s own equality semantics.
pub struct HolderList {
    client: reqwest::Client,
    url: Url,
    cache: tokio::sync::OnceCell<HashMap<Address, Vec<Address>>>,
}

impl HolderList {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            cache: tokio::sync::OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<&HashMap<Address, Vec<Address>>, SourceError> {
        self.cache
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .get(self.url.clone())
                    .timeout(FETCH_TIMEOUT)
                    .send()
                    .await
                    .map_err(|source| SourceError::Request {
                        url: self.url.to_string(),
                        source,
                    })?;
                let body: HashMap<String, Vec<Address>> =
                    response.json().await.map_err(|source| SourceError::Parse {
                        url: self.url.to_string(),
                        source,
                    })?;

                let mut holders = HashMap::with_capacity(body.len());
                for (key, list) in body {
                    if let Ok(address) = Address::from_str(&key) {
                        holders.insert(address, list);
                    }
                }
                Ok(holders)
            })
            .await
    }

    /// Returns the holder addresses known for `token`, or an empty list if
    /// the fetched document has no entry for it.
    pub async fn fetch(&self, token: Address) -> Result<Vec<Address>, SourceError> {
        let all = self.load().await?;
        Ok(all.get(&token).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_metadata_decodes_missing_fields_as_none() {
        let metadata: TokenMetadata = serde_json::from_str("{}").unwrap();
        assert!(metadata.symbol.is_none());
        assert!(metadata.decimals.is_none());
    }
}
