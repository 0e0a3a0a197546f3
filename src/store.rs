//! C4: the on-disk archive of resolved slots, plus the candidate-slot
//! schedule used to drive the search.

use {
    crate::{compiler::Compiler, error::StoreError, primitives::ChecksumAddress},
    alloy::primitives::Address,
    serde::{Deserialize, Serialize},
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
    },
};

/// The highest slot index the search tries before giving up on a variable.
pub const MAX_SLOT: u32 = 310;

/// Addresses the system refuses to probe at all — currently just the
/// sentinel pseudo-address some protocols use to mean "the native coin" in
/// an ERC20-shaped interface, which has no contract code to hold storage.
pub const SKIP_LIST: [Address; 1] = [Address::new([0xEE; 20])];

/// Whether `address` is in [`SKIP_LIST`] and must never be probed.
pub fn is_skipped(address: Address) -> bool {
    SKIP_LIST.contains(&address)
}

/// What's known about where one mapping variable (balance or allowance)
/// lives: the slot index within the holding contract, and which contract
/// actually holds it (the token itself, or a proxy's external storage
/// contract).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot: Option<u32>,
    pub target: Option<ChecksumAddress>,
}

impl SlotRecord {
    pub fn is_resolved(&self) -> bool {
        self.slot.is_some() && self.target.is_some()
    }
}

/// Everything recorded about a single token contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub balance: SlotRecord,
    #[serde(default)]
    pub allowance: SlotRecord,
    #[serde(default)]
    pub compiler: Option<Compiler>,
    #[serde(default)]
    pub symbol: Option<String>,
    /// `None` until the simulation phase runs; `Some(true)` means the
    /// synthesized `transferFrom` still fails and the token needs bespoke
    /// handling downstream.
    #[serde(default)]
    pub complex: Option<bool>,
}

impl TokenRecord {
    pub fn fully_resolved(&self) -> bool {
        self.balance.is_resolved() && self.allowance.is_resolved()
    }
}

/// The archive file: a checksum-address-keyed map of token records,
/// round-tripped as pretty JSON and rewritten atomically between batches so a
/// crash mid-run never corrupts previously recorded results.
#[derive(Debug, Default)]
pub struct Archive {
    path: PathBuf,
    records: HashMap<ChecksumAddress, TokenRecord>,
}

impl Archive {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self { path, records })
    }

    pub fn get(&self, token: Address) -> TokenRecord {
        self.records.get(&token.into()).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, token: Address, record: TokenRecord) {
        self.records.insert(token.into(), record);
    }

    pub fn tokens(&self) -> impl Iterator<Item = Address> + '_ {
        self.records.keys().map(|address| address.0)
    }

    /// Writes the archive to a temporary file in the same directory and
    /// renames it over the real path, so readers never observe a partially
    /// written file.
    pub fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, json).map_err(|source| StoreError::Write {
            path: tmp_path.display().to_string(),
            source,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Builds the order in which candidate slot indices are tried: the slots
/// already known to hold this variable on other tokens, most-common first
/// and deduplicated, followed by every remaining slot in `0..MAX_SLOT` in
/// ascending order.
///
/// Trying popular slots first means most standard ERC20 tokens resolve
/// within the first handful of probes; the fallback sweep guarantees every
/// token still gets a full search.
pub fn candidate_schedule(known_slots: impl IntoIterator<Item = u32>) -> Vec<u32> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for slot in known_slots {
        *counts.entry(slot).or_insert(0) += 1;
    }

    let mut by_frequency: Vec<u32> = counts.keys().copied().collect();
    by_frequency.sort_by(|a, b| counts[b].cmp(&counts[a]).then(a.cmp(b)));

    let mut seen: std::collections::HashSet<u32> = by_frequency.iter().copied().collect();
    let mut schedule = by_frequency;
    for slot in 0..MAX_SLOT {
        if seen.insert(slot) {
            schedule.push(slot);
        }
    }
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_orders_known_slots_by_frequency_then_ascending_sweep() {
        let schedule = candidate_schedule([9, 0, 0, 3, 9, 9]);
        assert_eq!(&schedule[..2], &[9, 0]);
        assert!(schedule.len() as u32 == MAX_SLOT);
        // Every slot in range still appears exactly once.
        let mut sorted = schedule.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len() as u32, MAX_SLOT);
    }

    #[test]
    fn native_coin_sentinel_is_skipped() {
        let sentinel: Address = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE".parse().unwrap();
        assert!(is_skipped(sentinel));
        assert!(!is_skipped(Address::repeat_byte(0x01)));
    }

    #[test]
    fn schedule_with_no_known_slots_is_the_plain_ascending_sweep() {
        let schedule = candidate_schedule([]);
        assert_eq!(schedule, (0..MAX_SLOT).collect::<Vec<_>>());
    }

    #[test]
    fn token_record_round_trips_through_json() {
        let record = TokenRecord {
            balance: SlotRecord {
                slot: Some(1),
                target: Some(Address::repeat_byte(0x11).into()),
            },
            allowance: SlotRecord::default(),
            compiler: Some(Compiler::Vyper),
            symbol: Some("TOK".to_string()),
            complex: Some(false),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TokenRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn archive_persists_and_reloads() {
        let dir = std::env::temp_dir().join(format!("slot-archive-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("archive.json");

        let mut archive = Archive::load(&path).unwrap();
        assert!(archive.tokens().next().is_none());

        let token = Address::repeat_byte(0x22);
        let mut record = TokenRecord::default();
        record.symbol = Some("FOO".to_string());
        archive.set(token, record.clone());
        archive.persist().unwrap();

        let reloaded = Archive::load(&path).unwrap();
        assert_eq!(reloaded.get(token), record);

        std::fs::remove_dir_all(&dir).ok();
    }
}
