use byteorder::{BigEndian, ByteOrder};

/// Width of the partition hash component of a table key, in bytes.
///
/// 8 bytes of a well-distributed hash keeps collisions vanishingly rare
/// for the number of distinct partitions any single node is expected to
/// see within one TTL window; a `u64` hash also sorts as a fixed-width
/// prefix without needing a centrally minted sequence number.
pub const PARTITION_HASH_LEN: usize = 8;
/// Width of the big-endian event-time component.
pub const TIME_LEN: usize = 8;
/// Width of the monotonic disambiguation suffix.
pub const SUFFIX_LEN: usize = 8;
/// Total width of an encoded [`TableKey`].
pub const KEY_LEN: usize = PARTITION_HASH_LEN + TIME_LEN + SUFFIX_LEN;

/// Hashes a partition string to its fixed-width key prefix.
///
/// Uses SeaHash: fast, and stable across process restarts, unlike
/// `std::hash::RandomState`.
pub fn hash_partition(partition: &str) -> [u8; PARTITION_HASH_LEN] {
    let h = seahash::hash(partition.as_bytes());
    let mut out = [0u8; PARTITION_HASH_LEN];
    BigEndian::write_u64(&mut out, h);
    out
}

/// The composite primary-store key: `(partition_hash, event_time, suffix)`.
///
/// Encoded big-endian component-wise so lexicographic byte order equals
/// `(partition_hash, event_time, suffix)` tuple order, which is what makes
/// range scans over `[low_key, high_key)` correct without decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableKey {
    pub partition_hash: [u8; PARTITION_HASH_LEN],
    pub event_time_ns: i64,
    pub suffix: u64,
}

impl TableKey {
    pub fn new(partition_hash: [u8; PARTITION_HASH_LEN], event_time_ns: i64, suffix: u64) -> Self {
        TableKey {
            partition_hash,
            event_time_ns,
            suffix,
        }
    }

    pub fn encode(&self) -> [u8; KEY_LEN] {
        let mut out = [0u8; KEY_LEN];
        out[..PARTITION_HASH_LEN].copy_from_slice(&self.partition_hash);
        // Flip the sign bit so that big-endian byte order of the biased
        // representation matches signed numeric order (standard trick for
        // storing signed integers in a byte-lexicographic key space).
        let biased = (self.event_time_ns as u64) ^ (1u64 << 63);
        BigEndian::write_u64(
            &mut out[PARTITION_HASH_LEN..PARTITION_HASH_LEN + TIME_LEN],
            biased,
        );
        BigEndian::write_u64(&mut out[PARTITION_HASH_LEN + TIME_LEN..], self.suffix);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<TableKey> {
        if bytes.len() != KEY_LEN {
            return None;
        }
        let mut partition_hash = [0u8; PARTITION_HASH_LEN];
        partition_hash.copy_from_slice(&bytes[..PARTITION_HASH_LEN]);
        let biased = BigEndian::read_u64(&bytes[PARTITION_HASH_LEN..PARTITION_HASH_LEN + TIME_LEN]);
        let event_time_ns = (biased ^ (1u64 << 63)) as i64;
        let suffix = BigEndian::read_u64(&bytes[PARTITION_HASH_LEN + TIME_LEN..]);
        Some(TableKey {
            partition_hash,
            event_time_ns,
            suffix,
        })
    }

    /// Lower bound (inclusive) for scanning a time range within a single
    /// partition prefix: `(partition_hash, t0, 0)`.
    pub fn range_start(partition_hash: [u8; PARTITION_HASH_LEN], t0_ns: i64) -> [u8; KEY_LEN] {
        TableKey::new(partition_hash, t0_ns, 0).encode()
    }

    /// Upper bound (exclusive) for scanning a time range within a single
    /// partition prefix: `(partition_hash, t1, 0)`.
    pub fn range_end(partition_hash: [u8; PARTITION_HASH_LEN], t1_ns: i64) -> [u8; KEY_LEN] {
        TableKey::new(partition_hash, t1_ns, 0).encode()
    }
}

/// Lower bound of the entire keyspace.
pub fn keyspace_start() -> [u8; KEY_LEN] {
    [0u8; KEY_LEN]
}

/// Exclusive upper bound of the entire keyspace.
pub fn keyspace_end() -> [u8; KEY_LEN] {
    [0xffu8; KEY_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let key = TableKey::new(hash_partition("device-42"), 1_700_000_000_000_000_000, 7);
        let decoded = TableKey::decode(&key.encode()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn byte_order_matches_chronological_order() {
        let p = hash_partition("same-partition");
        let earlier = TableKey::new(p, 100, 0).encode();
        let later = TableKey::new(p, 200, 0).encode();
        assert!(earlier < later);
    }

    #[test]
    fn negative_and_positive_times_order_correctly() {
        let p = hash_partition("p");
        let neg = TableKey::new(p, -1, 0).encode();
        let zero = TableKey::new(p, 0, 0).encode();
        let pos = TableKey::new(p, 1, 0).encode();
        assert!(neg < zero);
        assert!(zero < pos);
    }

    #[test]
    fn suffix_disambiguates_same_timestamp() {
        let p = hash_partition("p");
        let a = TableKey::new(p, 100, 0).encode();
        let b = TableKey::new(p, 100, 1).encode();
        assert!(a < b);
    }

    #[test]
    fn different_partitions_hash_to_different_prefixes() {
        assert_ne!(hash_partition("a"), hash_partition("b"));
    }
}
