use super::{Compressor, Method};
use std::io::{Read, Write};

pub struct Store;

impl Compressor for Store {
    fn method(&self) -> Method {
        Method::Store
    }

    fn compress(
        &self,
        src: &mut dyn Read,
        dst: &mut dyn Write,
        _level: u32,
    ) -> std::io::Result<u64> {
        std::io::copy(src, dst)
    }
}
