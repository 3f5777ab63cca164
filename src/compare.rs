use crate::key::parse_key;
use std::cmp::Ordering;
use std::fmt::Debug;

pub static BYTEWISE_COMPARATOR: &'static dyn Comparator =
    &BytewiseComparator {} as &'static dyn Comparator;

pub trait Comparator: Send + Sync + Debug + 'static {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn name(&self) -> &'static str;
}

pub type ComparatorImpl = &'static dyn Comparator;

#[derive(Default, Clone, Copy, Debug)]
pub struct BytewiseComparator {}

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn name(&self) -> &'static str {
        "BytewiseComparator"
    }
}

#[derive(Copy, Clone, Debug)]
pub struct InternalKeyComparator {
    u: ComparatorImpl,
}

impl From<ComparatorImpl> for InternalKeyComparator {
    fn from(u: ComparatorImpl) -> Self {
        Self { u }
    }
}

impl Comparator for InternalKeyComparator {
    // User part first. Ties are broken by the stored suffix bytes, which hold
    // u64::MAX - ts big-endian, so the newest version sorts first. A key
    // without a suffix sorts before every versioned key of the same user key.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match self.u.compare(parse_key(a), parse_key(b)) {
            Ordering::Equal => suffix(a).cmp(suffix(b)),
            o => o,
        }
    }

    fn name(&self) -> &'static str {
        "InternalKeyComparator"
    }
}

fn suffix(key: &[u8]) -> &[u8] {
    if key.len() < 8 {
        &[]
    } else {
        &key[key.len() - 8..]
    }
}
