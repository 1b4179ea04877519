//! Hashed template features.

use rensa_core::TemplateFeaturizer;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: impl IntoIterator<Item = u8>, mut hash: u64) -> u64 {
    for b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Maps each `(column, value)` pair of a token into one of a fixed number
/// of buckets with FNV-1a. Collisions are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenHasher {
    buckets: usize,
}

impl TokenHasher {
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }

    pub fn bucket(&self, column: usize, value: &str) -> usize {
        let hash = fnv1a((column as u32).to_le_bytes(), FNV_OFFSET);
        let hash = fnv1a(value.bytes(), hash);
        (hash % self.buckets as u64) as usize
    }
}

impl TemplateFeaturizer for TokenHasher {
    fn feature_size(&self) -> usize {
        self.buckets
    }

    fn feature_ids(&self, tokens: &[Vec<String>], position: usize) -> Vec<usize> {
        tokens
            .get(position)
            .map(|columns| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(c, v)| self.bucket(c, v))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_reference_value() {
        // FNV-1a 64 of "a"
        assert_eq!(fnv1a(*b"a", FNV_OFFSET), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn ids_stay_in_range_and_are_stable() {
        let hasher = TokenHasher::new(64);
        let tokens = vec![vec!["Tokyo".to_string(), "NNP".to_string()]];
        let ids = hasher.feature_ids(&tokens, 0);
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|&id| id < 64));
        assert_eq!(ids, hasher.feature_ids(&tokens, 0));
    }

    #[test]
    fn column_is_part_of_the_key() {
        let hasher = TokenHasher::new(1 << 20);
        assert_ne!(hasher.bucket(0, "NNP"), hasher.bucket(1, "NNP"));
    }

    #[test]
    fn out_of_range_position_has_no_features() {
        let hasher = TokenHasher::new(8);
        assert!(hasher.feature_ids(&[], 3).is_empty());
    }
}
