use bytes::{BufMut, Bytes, BytesMut};

// Internal keys carry an 8-byte big-endian suffix holding u64::MAX - ts, so
// that ascending byte order places the newest version of a user key first.
// Keys shorter than 8 bytes carry no timestamp at all: parse_key returns them
// whole and parse_ts reports 0.

pub fn key_with_ts(key: &[u8], ts: u64) -> Bytes {
    let mut ik = BytesMut::with_capacity(key.len() + 8);
    ik.put_slice(key);
    ik.put_u64(u64::MAX - ts);
    ik.freeze()
}

pub fn parse_key(key: &[u8]) -> &[u8] {
    if key.len() < 8 {
        return key;
    }
    &key[..key.len() - 8]
}

pub fn parse_ts(key: &[u8]) -> u64 {
    if key.len() < 8 {
        return 0;
    }
    let suffix: [u8; 8] = key[key.len() - 8..].try_into().unwrap();
    u64::MAX - u64::from_be_bytes(suffix)
}

pub fn same_key(src: &[u8], dst: &[u8]) -> bool {
    if src.len() != dst.len() {
        return false;
    }
    parse_key(src) == parse_key(dst)
}
