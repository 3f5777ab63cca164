use crate::arena::Arena;
use crate::compare::{Comparator, InternalKeyComparator};
use crate::entry::{Entry, ValueStruct};
use crate::key::{parse_ts, same_key};
use crate::opts::{Opts, OptsRaw};
use bytes::Bytes;
use rand::Rng;
use std::cmp::Ordering as CmpOrdering;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

pub(crate) const MAX_HEIGHT: usize = 20;
const HEIGHT_INCREASE: u32 = u32::MAX / 3;

// fixed-layout record inside the arena; only `value` changes after publish
#[repr(C)]
pub(crate) struct Node {
    // hi 32 bits: encoded value size, lo 32 bits: arena offset of the bytes
    value: AtomicU64,

    key_offset: u32,
    key_size: u16,

    height: u16,

    // Forward offsets, one per level. Slots at `height` and above are not
    // backed by arena storage and must never be touched.
    tower: [AtomicU32; MAX_HEIGHT],
}

impl Node {
    fn new<'a>(arena: &'a Arena, key: &[u8], v: &ValueStruct, height: usize) -> &'a Node {
        debug_assert!(key.len() <= u16::MAX as usize);
        let node_offset = arena.put_node(height);
        let key_offset = arena.put_key(key);
        let value = encode_value(arena.put_val(v), v.encoded_size());

        // The node is unreachable until a level-0 CAS publishes it, so plain
        // writes cannot race with readers. The arena hands out zeroed memory,
        // which leaves the tower all-null.
        unsafe {
            let node = arena.node_ptr(node_offset);
            (*node).key_offset = key_offset;
            (*node).key_size = key.len() as u16;
            (*node).height = height as u16;
            (*node).value = AtomicU64::new(value);
            &*node
        }
    }

    fn value_offset(&self) -> (u32, u32) {
        decode_value(self.value.load(Ordering::Acquire))
    }

    fn set_value(&self, vo: u64) {
        self.value.store(vo, Ordering::Release);
    }

    fn key<'a>(&self, arena: &'a Arena) -> &'a [u8] {
        arena.get_key(self.key_offset, self.key_size)
    }

    fn next_offset(&self, h: usize) -> u32 {
        self.tower[h].load(Ordering::Acquire)
    }

    fn cas_next_offset(&self, h: usize, old: u32, val: u32) -> bool {
        self.tower[h]
            .compare_exchange(old, val, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn vs<'a>(&self, arena: &'a Arena) -> ValueStruct<'a> {
        let (val_offset, val_size) = self.value_offset();
        arena.get_val(val_offset, val_size)
    }
}

fn encode_value(val_offset: u32, val_size: u32) -> u64 {
    (val_size as u64) << 32 | val_offset as u64
}

fn decode_value(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}

struct SkiplistCore {
    // current height, 1..=MAX_HEIGHT, raised by CAS and never lowered
    height: AtomicU32,
    head_offset: u32,
    arena: Arena,
    icmp: InternalKeyComparator,
    on_close: Option<Box<dyn FnOnce() -> () + Send + Sync>>,
}

impl Drop for SkiplistCore {
    fn drop(&mut self) {
        if let Some(f) = self.on_close.take() {
            f();
        }
    }
}

// A cloneable handle: every clone (iterators included) holds one reference.
// When the last one drops, on_close fires and the arena is released.
#[derive(Clone)]
pub struct Skiplist {
    core: Arc<SkiplistCore>,
}

impl Skiplist {
    pub fn new(arena_size: u32) -> Skiplist {
        Skiplist::with_opts(Arc::new(OptsRaw {
            arena_capacity: arena_size,
            ..OptsRaw::default()
        }))
    }

    pub fn with_opts(opts: Opts) -> Skiplist {
        let arena = Arena::new(opts.get_arena_capacity());
        let head_offset = {
            let head = Node::new(&arena, &[], &ValueStruct::default(), MAX_HEIGHT);
            arena.node_offset(head)
        };
        Skiplist {
            core: Arc::new(SkiplistCore {
                height: AtomicU32::new(1),
                head_offset,
                arena,
                icmp: opts.get_icmp(),
                on_close: None,
            }),
        }
    }

    // only callable while the handle is still unique, i.e. at construction
    pub fn set_on_close(&mut self, f: impl FnOnce() -> () + Send + Sync + 'static) {
        let core = Arc::get_mut(&mut self.core)
            .expect("on_close can only be set before the skiplist is shared");
        core.on_close = Some(Box::new(f));
    }

    fn arena(&self) -> &Arena {
        &self.core.arena
    }

    fn icmp(&self) -> InternalKeyComparator {
        self.core.icmp
    }

    fn head(&self) -> &Node {
        // allocated in with_opts, never offset 0
        self.arena()
            .get_node(self.core.head_offset)
            .expect("head node")
    }

    fn get_next(&self, nd: &Node, height: usize) -> Option<&Node> {
        self.arena().get_node(nd.next_offset(height))
    }

    fn get_height(&self) -> usize {
        self.core.height.load(Ordering::Acquire) as usize
    }

    fn random_height(&self) -> usize {
        let mut rng = rand::thread_rng();
        let mut h = 1;
        while h < MAX_HEIGHT && rng.gen::<u32>() <= HEIGHT_INCREASE {
            h += 1;
        }
        h
    }

    // nearest node at the base level: less/allow_equal pick the boundary
    // (>=, >, <=, <). The bool reports an exact match; the head sentinel is
    // never returned.
    fn find_near(&self, key: &[u8], less: bool, allow_equal: bool) -> (Option<&Node>, bool) {
        let head = self.head();
        let mut x = head;
        let mut level = self.get_height() - 1;
        loop {
            // x.key < key at every step
            let next = match self.get_next(x, level) {
                Some(n) => n,
                None => {
                    // rightmost node at this level
                    if level > 0 {
                        level -= 1;
                        continue;
                    }
                    if !less {
                        return (None, false);
                    }
                    if ptr::eq(x, head) {
                        return (None, false);
                    }
                    return (Some(x), false);
                }
            };
            match self.icmp().compare(key, next.key(self.arena())) {
                CmpOrdering::Greater => {
                    // x.key < next.key < key, keep moving right
                    x = next;
                }
                CmpOrdering::Equal => {
                    if allow_equal {
                        return (Some(next), true);
                    }
                    if !less {
                        // the next bigger node sits on the base level
                        return (self.get_next(next, 0), false);
                    }
                    if level > 0 {
                        level -= 1;
                        continue;
                    }
                    if ptr::eq(x, head) {
                        return (None, false);
                    }
                    return (Some(x), false);
                }
                CmpOrdering::Less => {
                    // x.key < key < next.key
                    if level > 0 {
                        level -= 1;
                        continue;
                    }
                    if !less {
                        return (Some(next), false);
                    }
                    if ptr::eq(x, head) {
                        return (None, false);
                    }
                    return (Some(x), false);
                }
            }
        }
    }

    // walks right from `before` until the splice bounding `key` is found;
    // returns (next, next) when the scanned key equals `key`
    fn find_splice_for_level(&self, key: &[u8], mut before: u32, level: usize) -> (u32, u32) {
        loop {
            let before_node = self
                .arena()
                .get_node(before)
                .expect("splice start must be a live node");
            let next = before_node.next_offset(level);
            let next_node = match self.arena().get_node(next) {
                Some(n) => n,
                None => return (before, next),
            };
            match self.icmp().compare(key, next_node.key(self.arena())) {
                CmpOrdering::Equal => return (next, next),
                CmpOrdering::Less => return (before, next),
                CmpOrdering::Greater => before = next,
            }
        }
    }

    fn overwrite_value(&self, node_offset: u32, v: &ValueStruct) {
        // updates never touch old bytes: a fresh cell is written and the
        // value word is swung over atomically
        let vo = self.arena().put_val(v);
        let enc = encode_value(vo, v.encoded_size());
        let node = self
            .arena()
            .get_node(node_offset)
            .expect("overwrite target must be a live node");
        node.set_value(enc);
    }

    // overwrites the value if the internal key is already present; contended
    // splices are retried by CAS
    pub fn put(&self, e: &Entry) {
        let key: &[u8] = &e.key;
        let v = ValueStruct {
            meta: e.meta,
            expires_at: e.expires_at,
            value: &e.value,
            version: e.version,
        };

        let mut list_height = self.get_height();
        let mut prev = [0u32; MAX_HEIGHT + 1];
        let mut next = [0u32; MAX_HEIGHT + 1];
        prev[list_height] = self.core.head_offset;
        for i in (0..list_height).rev() {
            let (p, n) = self.find_splice_for_level(key, prev[i + 1], i);
            prev[i] = p;
            next[i] = n;
            if p == n {
                self.overwrite_value(p, &v);
                return;
            }
        }

        let height = self.random_height();
        let x = Node::new(self.arena(), key, &v, height);
        let x_offset = self.arena().node_offset(x);

        // raise the list height; a lost CAS means another writer raised it
        list_height = self.get_height();
        while height > list_height {
            match self.core.height.compare_exchange(
                list_height as u32,
                height as u32,
                Ordering::SeqCst,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(h) => list_height = h as usize,
            }
        }

        for i in 0..height {
            loop {
                if self.arena().get_node(prev[i]).is_none() {
                    // this level sat above the height observed during the
                    // descent, so no splice was computed for it
                    assert!(i > 1, "unfilled splice below level 2: {}", i);
                    let (p, n) = self.find_splice_for_level(key, self.core.head_offset, i);
                    prev[i] = p;
                    next[i] = n;
                    assert_ne!(prev[i], next[i], "duplicate key above the base level");
                }
                x.tower[i].store(next[i], Ordering::Relaxed);
                let pnode = self
                    .arena()
                    .get_node(prev[i])
                    .expect("splice predecessor must be a live node");
                if pnode.cas_next_offset(i, next[i], x_offset) {
                    break;
                }
                // lost the race at this level, recompute the splice and retry
                let (p, n) = self.find_splice_for_level(key, prev[i], i);
                prev[i] = p;
                next[i] = n;
                if p == n {
                    // a racing writer inserted the same key; it must have
                    // finished level 0 before climbing, so equality anywhere
                    // else means the structure is corrupt
                    assert_eq!(i, 0, "equality can only happen on the base level: {}", i);
                    self.overwrite_value(p, &v);
                    return;
                }
            }
        }
    }

    // least stored key at or after `key`, if both share a user key;
    // expires_at reports the timestamp of the version actually hit
    pub fn get(&self, key: &[u8]) -> Option<ValueStruct<'_>> {
        let (n, _) = self.find_near(key, false, true);
        let n = n?;

        let next_key = n.key(self.arena());
        if !same_key(key, next_key) {
            return None;
        }

        let mut vs = n.vs(self.arena());
        vs.expires_at = parse_ts(next_key);
        Some(vs)
    }

    fn find_last(&self) -> Option<&Node> {
        let head = self.head();
        let mut n = head;
        let mut level = self.get_height() - 1;
        loop {
            match self.get_next(n, level) {
                Some(next) => n = next,
                None => {
                    if level == 0 {
                        if ptr::eq(n, head) {
                            return None;
                        }
                        return Some(n);
                    }
                    level -= 1;
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.find_last().is_none()
    }

    // the arena cursor, a monotonic upper bound on memory in use
    pub fn mem_size(&self) -> u64 {
        self.arena().size()
    }

    pub fn height(&self) -> usize {
        self.get_height()
    }

    pub fn new_iterator(&self) -> SkiplistIterator {
        SkiplistIterator {
            list: self.clone(),
            n: ptr::null(),
        }
    }
}

fn node_ptr_or_null(nd: Option<&Node>) -> *const Node {
    nd.map_or(ptr::null(), |n| n as *const Node)
}

// holds one reference, so the arena stays alive as long as the iterator does
pub struct SkiplistIterator {
    list: Skiplist,
    n: *const Node,
}

// the raw node pointer targets arena memory owned by `list`, which travels
// with the iterator
unsafe impl Send for SkiplistIterator {}

impl SkiplistIterator {
    pub fn valid(&self) -> bool {
        !self.n.is_null()
    }

    pub fn key(&self) -> &[u8] {
        assert!(self.valid(), "iterator is not positioned at a node");
        unsafe { (*self.n).key(self.list.arena()) }
    }

    pub fn value(&self) -> ValueStruct<'_> {
        assert!(self.valid(), "iterator is not positioned at a node");
        unsafe { (*self.n).vs(self.list.arena()) }
    }

    // materializes the current position as an owned entry
    pub fn item(&self) -> Entry {
        let vs = self.value();
        Entry {
            key: Bytes::copy_from_slice(self.key()),
            value: Bytes::copy_from_slice(vs.value),
            expires_at: vs.expires_at,
            meta: vs.meta,
            version: vs.version,
        }
    }

    pub fn next(&mut self) {
        assert!(self.valid(), "iterator is not positioned at a node");
        self.n = node_ptr_or_null(self.list.get_next(unsafe { &*self.n }, 0));
    }

    pub fn prev(&mut self) {
        assert!(self.valid(), "iterator is not positioned at a node");
        let n = {
            let (nd, _) = self.list.find_near(self.key(), true, false);
            node_ptr_or_null(nd)
        };
        self.n = n;
    }

    pub fn seek(&mut self, target: &[u8]) {
        self.n = node_ptr_or_null(self.list.find_near(target, false, true).0);
    }

    pub fn seek_for_prev(&mut self, target: &[u8]) {
        self.n = node_ptr_or_null(self.list.find_near(target, true, true).0);
    }

    pub fn seek_to_first(&mut self) {
        self.n = node_ptr_or_null(self.list.get_next(self.list.head(), 0));
    }

    pub fn seek_to_last(&mut self) {
        self.n = node_ptr_or_null(self.list.find_last());
    }

    pub fn rewind(&mut self) {
        self.seek_to_first();
    }

    // drops this iterator's reference
    pub fn close(self) {}
}
