use crate::compare::{ComparatorImpl, InternalKeyComparator, BYTEWISE_COMPARATOR};
use std::sync::Arc;

pub type Opts = Arc<OptsRaw>;

pub struct OptsRaw {
    pub arena_capacity: u32,
    pub comparer: ComparatorImpl,
}

pub fn default_opts() -> Opts {
    Arc::new(OptsRaw::default())
}

impl Default for OptsRaw {
    fn default() -> Self {
        Self {
            arena_capacity: 4194304, // 4mb
            comparer: BYTEWISE_COMPARATOR,
        }
    }
}

impl OptsRaw {
    pub fn get_ucmp(&self) -> ComparatorImpl {
        self.comparer
    }

    pub fn get_icmp(&self) -> InternalKeyComparator {
        InternalKeyComparator::from(self.comparer)
    }

    pub fn get_arena_capacity(&self) -> u32 {
        if self.arena_capacity == 0 {
            OptsRaw::default().arena_capacity
        } else {
            self.arena_capacity
        }
    }
}
