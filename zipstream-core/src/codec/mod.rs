use std::io::{Read, Write};

/// ZIP compression method identifiers (APPNOTE 4.4.5).
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Store = 0,
    Deflate = 8,
}

pub trait Compressor: Send + Sync {
    fn method(&self) -> Method;
    /// Stream `src` to exhaustion into `dst`, returning uncompressed bytes
    /// consumed. Implementations hold at most one buffer of working state.
    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: u32) -> std::io::Result<u64>;
}

pub mod deflate;
pub mod store;

pub use deflate::Deflate;
pub use store::Store;

/// Pick the encoder for one entry name per the store-extension heuristic.
pub fn for_entry(is_store: bool) -> &'static dyn Compressor {
    if is_store { &Store } else { &Deflate }
}
