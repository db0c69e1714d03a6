//! Key-to-path sharding
//!
//! Every cache key maps to `<cache_dir>/<bucket1>/<bucket2>/<sha256(key)>`.
//! The two bucket levels are derived from the hex digest with a small
//! multiplicative hash, so no directory ever holds more than 4096 children.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Number of children per bucket level
pub const BUCKET_COUNT: u64 = 0x1000;

const FOLD_SEED: u64 = 7;
const FOLD_MULTIPLIER: u64 = 31;
const FOLD_MODULUS: u64 = 982_451_653;

/// Location of a cache entry's leaf directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPath {
    pub bucket1_hex: String,
    pub bucket2_hex: String,
    pub content_hash: String,
    pub leaf_path: PathBuf,
}

/// Lowercase hex SHA-256 of the cache key
pub fn content_hash(cache_key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cache_key);
    hex::encode(hasher.finalize())
}

/// Rolling hash over the characters of `input`, in `[0, 982451652]`
pub fn fold_hash(input: &str) -> u64 {
    // acc < 2^30 and codepoints are < 2^21, so the product fits in u64.
    input.chars().fold(FOLD_SEED, |acc, c| {
        (acc * FOLD_MULTIPLIER * u64::from(u32::from(c))) % FOLD_MODULUS
    })
}

/// Bucket pair for a content hash
pub fn shard_coordinate(content_hash: &str) -> (u64, u64) {
    let h = fold_hash(content_hash);
    (h % BUCKET_COUNT, (h / BUCKET_COUNT) % BUCKET_COUNT)
}

pub fn compute_shard_path(cache_dir: &Path, cache_key: &[u8]) -> ShardPath {
    let content_hash = content_hash(cache_key);
    let (bucket1, bucket2) = shard_coordinate(&content_hash);
    let bucket1_hex = format!("{:x}", bucket1);
    let bucket2_hex = format!("{:x}", bucket2);
    let leaf_path = cache_dir
        .join(&bucket1_hex)
        .join(&bucket2_hex)
        .join(&content_hash);

    ShardPath {
        bucket1_hex,
        bucket2_hex,
        content_hash,
        leaf_path,
    }
}
