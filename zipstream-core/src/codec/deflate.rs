use super::{Compressor, Method};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::{Read, Write};

/// Raw deflate, no zlib/gzip wrapper, as ZIP method 8 requires.
pub struct Deflate;

impl Compressor for Deflate {
    fn method(&self) -> Method {
        Method::Deflate
    }

    fn compress(&self, src: &mut dyn Read, dst: &mut dyn Write, level: u32) -> std::io::Result<u64> {
        let mut enc = DeflateEncoder::new(dst, Compression::new(level.min(9)));
        let consumed = std::io::copy(src, &mut enc)?;
        enc.finish()?;
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    #[test]
    fn roundtrips_through_raw_deflate() {
        let input = b"the same bytes, the same bytes, the same bytes".repeat(50);
        let mut compressed = Vec::new();
        let n = Deflate
            .compress(&mut input.as_slice(), &mut compressed, 6)
            .unwrap();
        assert_eq!(n, input.len() as u64);
        assert!(compressed.len() < input.len());

        let mut back = Vec::new();
        DeflateDecoder::new(compressed.as_slice())
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back, input);
    }
}
