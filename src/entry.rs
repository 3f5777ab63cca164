use crate::utils::varint::{uvarint, uvarint_len, write_uvarint};
use bytes::Bytes;

// Decoded value cell, borrowing the buffer it was decoded from. Wire form:
// meta | uvarint(expires_at) | value. version is never encoded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValueStruct<'a> {
    pub meta: u8,
    pub expires_at: u64,
    pub value: &'a [u8],

    pub version: u64,
}

impl<'a> ValueStruct<'a> {
    pub fn encoded_size(&self) -> u32 {
        (1 + uvarint_len(self.expires_at) + self.value.len()) as u32
    }

    // buf must be at least encoded_size() bytes
    pub fn encode(&self, buf: &mut [u8]) -> u32 {
        buf[0] = self.meta;
        let sz = write_uvarint(&mut buf[1..], self.expires_at);
        buf[1 + sz..1 + sz + self.value.len()].copy_from_slice(self.value);
        (1 + sz + self.value.len()) as u32
    }

    pub fn decode(buf: &'a [u8]) -> ValueStruct<'a> {
        let (expires_at, sz) = uvarint(&buf[1..]).expect("malformed value cell");
        ValueStruct {
            meta: buf[0],
            expires_at,
            value: &buf[1 + sz..],
            version: 0,
        }
    }
}

// The write-side record handed to the skiplist. `key` is an internal key,
// user key plus timestamp suffix.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Bytes,
    pub expires_at: u64,

    pub meta: u8,
    pub version: u64,
}

impl Entry {
    pub fn new(key: Bytes, value: Bytes) -> Entry {
        Entry {
            key,
            value,
            ..Entry::default()
        }
    }
}

#[cfg(test)]
mod test {
    use crate::entry::{Entry, ValueStruct};
    use bytes::Bytes;

    #[test]
    fn test_value_codec() {
        let cases = vec![
            ValueStruct {
                meta: 0,
                expires_at: 0,
                value: b"",
                version: 0,
            },
            ValueStruct {
                meta: 1,
                expires_at: 127,
                value: b"v",
                version: 0,
            },
            ValueStruct {
                meta: 0xff,
                expires_at: u64::MAX,
                value: b"some longer value payload",
                version: 0,
            },
        ];
        for v in cases.iter() {
            let mut buf = vec![0u8; v.encoded_size() as usize];
            let n = v.encode(&mut buf);
            assert_eq!(n, v.encoded_size());
            assert_eq!(&ValueStruct::decode(&buf), v);
        }
    }

    #[test]
    fn test_encoded_size() {
        let v = ValueStruct {
            meta: 3,
            expires_at: 1 << 21,
            value: b"abc",
            version: 0,
        };
        // meta + 4-byte varint + payload
        assert_eq!(v.encoded_size(), 1 + 4 + 3);
    }

    #[test]
    fn test_entry_new() {
        let e = Entry::new(Bytes::from_static(b"k"), Bytes::from_static(b"v"));
        assert_eq!(e.key.as_ref(), b"k");
        assert_eq!(e.value.as_ref(), b"v");
        assert_eq!(e.meta, 0);
        assert_eq!(e.expires_at, 0);
        assert_eq!(e.version, 0);
    }
}
