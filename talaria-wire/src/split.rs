use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// An opaque split token naming a contiguous `[low_key, high_key)` range
/// in the primary store's keyspace (§4.6, §GLOSSARY). Only this server's
/// `GetSplitData` needs to understand the token; the query engine treats
/// it as an opaque handle.
///
/// The token also carries the query's original `[time_low_ns, time_high_ns)`
/// bound. Splits are grouped at block granularity ("never splitting a
/// single block"), so a block's own `(min_time_ns, max_time_ns)` can
/// extend outside that bound even when the block's key falls inside it;
/// carrying the bound in the token lets whichever node ends up serving
/// the split (assignment is advisory, §4.6 step 4) filter rows down to
/// exactly `time_low_ns <= time < time_high_ns` without needing to see
/// the original request again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitToken {
    pub low_key: Vec<u8>,
    pub high_key: Vec<u8>,
    pub time_low_ns: i64,
    pub time_high_ns: i64,
}

impl SplitToken {
    pub fn new(low_key: Vec<u8>, high_key: Vec<u8>, time_low_ns: i64, time_high_ns: i64) -> Self {
        SplitToken {
            low_key,
            high_key,
            time_low_ns,
            time_high_ns,
        }
    }

    /// A split with no row-level time filter, for tables (e.g. `nodes`)
    /// that have no time semantics at all.
    pub fn unbounded(low_key: Vec<u8>, high_key: Vec<u8>) -> Self {
        SplitToken::new(low_key, high_key, i64::MIN, i64::MAX)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(24 + self.low_key.len() + self.high_key.len());
        let mut len_buf = [0u8; 4];
        LittleEndian::write_u32(&mut len_buf, self.low_key.len() as u32);
        buf.extend_from_slice(&len_buf);
        buf.extend_from_slice(&self.low_key);
        LittleEndian::write_u32(&mut len_buf, self.high_key.len() as u32);
        buf.extend_from_slice(&len_buf);
        buf.extend_from_slice(&self.high_key);
        let mut time_buf = [0u8; 8];
        BigEndian::write_i64(&mut time_buf, self.time_low_ns);
        buf.extend_from_slice(&time_buf);
        BigEndian::write_i64(&mut time_buf, self.time_high_ns);
        buf.extend_from_slice(&time_buf);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<SplitToken> {
        if bytes.len() < 4 {
            return None;
        }
        let low_len = LittleEndian::read_u32(&bytes[0..4]) as usize;
        let low_start = 4;
        let low_end = low_start.checked_add(low_len)?;
        if bytes.len() < low_end + 4 {
            return None;
        }
        let low_key = bytes[low_start..low_end].to_vec();
        let high_len_start = low_end;
        let high_len = LittleEndian::read_u32(&bytes[high_len_start..high_len_start + 4]) as usize;
        let high_start = high_len_start + 4;
        let high_end = high_start.checked_add(high_len)?;
        if bytes.len() != high_end + 16 {
            return None;
        }
        let high_key = bytes[high_start..high_end].to_vec();
        let time_low_ns = BigEndian::read_i64(&bytes[high_end..high_end + 8]);
        let time_high_ns = BigEndian::read_i64(&bytes[high_end + 8..high_end + 16]);
        Some(SplitToken {
            low_key,
            high_key,
            time_low_ns,
            time_high_ns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let token = SplitToken::new(vec![1, 2, 3], vec![9, 9], -5, 100);
        let bytes = token.encode();
        assert_eq!(SplitToken::decode(&bytes), Some(token));
    }

    #[test]
    fn unbounded_carries_sentinel_time_range() {
        let token = SplitToken::unbounded(vec![1], vec![2]);
        assert_eq!(token.time_low_ns, i64::MIN);
        assert_eq!(token.time_high_ns, i64::MAX);
        assert_eq!(SplitToken::decode(&token.encode()), Some(token));
    }

    #[test]
    fn rejects_truncated_bytes() {
        let token = SplitToken::new(vec![1, 2, 3], vec![9, 9], 0, 1);
        let mut bytes = token.encode();
        bytes.truncate(bytes.len() - 1);
        assert_eq!(SplitToken::decode(&bytes), None);
    }
}
