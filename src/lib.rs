mod arena;

pub mod compare;
pub mod entry;
pub mod key;
pub mod opts;
pub mod skiplist;
pub mod utils;

pub use entry::{Entry, ValueStruct};
pub use opts::{default_opts, Opts, OptsRaw};
pub use skiplist::{Skiplist, SkiplistIterator};
