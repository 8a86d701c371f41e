use crate::codec::Method;
use std::io::{self, Write};

pub const LOCAL_SIG: u32 = 0x04034b50;
pub const DESCRIPTOR_SIG: u32 = 0x08074b50;
pub const CENTRAL_SIG: u32 = 0x02014b50;
pub const EOCD_SIG: u32 = 0x06054b50;
pub const EOCD64_SIG: u32 = 0x06064b50;
pub const EOCD64_LOCATOR_SIG: u32 = 0x07064b50;

/// General-purpose flag bit 3: sizes/CRC follow the data in a descriptor.
pub const FLAG_STREAMED: u16 = 0x0008;
/// General-purpose flag bit 11: name is UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;
const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_ZIP64; // unix

const ZIP64_EXTRA_ID: u16 = 0x0001;
/// 32-bit size/offset fields at or above this sentinel defer to Zip64.
pub const ZIP64_LIMIT: u64 = 0xFFFF_FFFF;

/// External-attributes word: unix mode in the high half, DOS directory bit
/// in the low half.
pub fn unix_external_attrs(mode: u32, is_dir: bool) -> u32 {
    (mode << 16) | if is_dir { 0x10 } else { 0 }
}

#[derive(Debug, Clone)]
pub struct LocalHeader<'a> {
    pub name: &'a str,
    pub method: Method,
    pub flags: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    /// Known up front only for directory entries; streamed files carry
    /// zeros here and real values in the trailing descriptor.
    pub crc32: u32,
    pub c_size: u64,
    pub u_size: u64,
    /// Entry may exceed 4 GiB: write Zip64 sentinels and an extra field.
    pub zip64: bool,
}

impl LocalHeader<'_> {
    /// Serialized length in the output stream.
    pub fn encoded_len(&self) -> u64 {
        30 + self.name.len() as u64 + if self.zip64 { 20 } else { 0 }
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        let (c32, u32_) = if self.zip64 {
            (ZIP64_LIMIT as u32, ZIP64_LIMIT as u32)
        } else {
            (self.c_size as u32, self.u_size as u32)
        };
        let version = if self.zip64 {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        };
        let extra_len: u16 = if self.zip64 { 20 } else { 0 };

        w.write_all(&LOCAL_SIG.to_le_bytes())?;
        w.write_all(&version.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&(self.method as u16).to_le_bytes())?;
        w.write_all(&self.dos_time.to_le_bytes())?;
        w.write_all(&self.dos_date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&c32.to_le_bytes())?;
        w.write_all(&u32_.to_le_bytes())?;
        w.write_all(&(self.name.len() as u16).to_le_bytes())?;
        w.write_all(&extra_len.to_le_bytes())?;
        w.write_all(self.name.as_bytes())?;
        if self.zip64 {
            // Sizes are not known yet; the descriptor carries the truth.
            w.write_all(&ZIP64_EXTRA_ID.to_le_bytes())?;
            w.write_all(&16u16.to_le_bytes())?;
            w.write_all(&self.u_size.to_le_bytes())?;
            w.write_all(&self.c_size.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Trailing record for a streamed entry (flag bit 3).
#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub c_size: u64,
    pub u_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub fn encoded_len(&self) -> u64 {
        if self.zip64 { 24 } else { 16 }
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        w.write_all(&DESCRIPTOR_SIG.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        if self.zip64 {
            w.write_all(&self.c_size.to_le_bytes())?;
            w.write_all(&self.u_size.to_le_bytes())?;
        } else {
            w.write_all(&(self.c_size as u32).to_le_bytes())?;
            w.write_all(&(self.u_size as u32).to_le_bytes())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CentralEntry {
    pub name: String,
    pub method: Method,
    pub flags: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub c_size: u64,
    pub u_size: u64,
    pub local_off: u64,
    pub external_attrs: u32,
    /// Entry was written with an 8-byte descriptor, so readers need Zip64
    /// support even if the final sizes fit 32 bits.
    pub zip64_stream: bool,
}

impl CentralEntry {
    // Zip64 extra carries, in order, only the fields whose 32-bit slots
    // hold the sentinel (APPNOTE 4.5.3).
    fn zip64_fields(&self) -> (bool, bool, bool) {
        (
            self.u_size >= ZIP64_LIMIT,
            self.c_size >= ZIP64_LIMIT,
            self.local_off >= ZIP64_LIMIT,
        )
    }

    pub fn encoded_len(&self) -> u64 {
        let (u, c, off) = self.zip64_fields();
        let n = [u, c, off].iter().filter(|b| **b).count() as u64;
        46 + self.name.len() as u64 + if n > 0 { 4 + 8 * n } else { 0 }
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        let (z_u, z_c, z_off) = self.zip64_fields();
        let any_zip64 = z_u || z_c || z_off;
        let version = if any_zip64 || self.zip64_stream {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        };
        let extra_len: u16 = if any_zip64 {
            (4 + 8 * [z_u, z_c, z_off].iter().filter(|b| **b).count()) as u16
        } else {
            0
        };

        w.write_all(&CENTRAL_SIG.to_le_bytes())?;
        w.write_all(&VERSION_MADE_BY.to_le_bytes())?;
        w.write_all(&version.to_le_bytes())?;
        w.write_all(&self.flags.to_le_bytes())?;
        w.write_all(&(self.method as u16).to_le_bytes())?;
        w.write_all(&self.dos_time.to_le_bytes())?;
        w.write_all(&self.dos_date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&clamp32(self.c_size, z_c).to_le_bytes())?;
        w.write_all(&clamp32(self.u_size, z_u).to_le_bytes())?;
        w.write_all(&(self.name.len() as u16).to_le_bytes())?;
        w.write_all(&extra_len.to_le_bytes())?;
        w.write_all(&0u16.to_le_bytes())?; // comment len
        w.write_all(&0u16.to_le_bytes())?; // disk number start
        w.write_all(&0u16.to_le_bytes())?; // internal attrs
        w.write_all(&self.external_attrs.to_le_bytes())?;
        w.write_all(&clamp32(self.local_off, z_off).to_le_bytes())?;
        w.write_all(self.name.as_bytes())?;

        if any_zip64 {
            w.write_all(&ZIP64_EXTRA_ID.to_le_bytes())?;
            w.write_all(&(extra_len - 4).to_le_bytes())?;
            if z_u {
                w.write_all(&self.u_size.to_le_bytes())?;
            }
            if z_c {
                w.write_all(&self.c_size.to_le_bytes())?;
            }
            if z_off {
                w.write_all(&self.local_off.to_le_bytes())?;
            }
        }
        Ok(())
    }
}

fn clamp32(v: u64, zip64: bool) -> u32 {
    if zip64 { ZIP64_LIMIT as u32 } else { v as u32 }
}

/// Close the archive: Zip64 end records when any field overflows the
/// classic EOCD, then the EOCD itself.
pub fn write_end_of_directory(
    mut w: impl Write,
    entries: u64,
    cd_off: u64,
    cd_size: u64,
) -> io::Result<()> {
    let need_zip64 =
        entries > u16::MAX as u64 || cd_off >= ZIP64_LIMIT || cd_size >= ZIP64_LIMIT;

    if need_zip64 {
        let eocd64_off = cd_off + cd_size;

        w.write_all(&EOCD64_SIG.to_le_bytes())?;
        w.write_all(&44u64.to_le_bytes())?; // record size, from version-made-by on
        w.write_all(&VERSION_MADE_BY.to_le_bytes())?;
        w.write_all(&VERSION_ZIP64.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // this disk
        w.write_all(&0u32.to_le_bytes())?; // cd start disk
        w.write_all(&entries.to_le_bytes())?;
        w.write_all(&entries.to_le_bytes())?;
        w.write_all(&cd_size.to_le_bytes())?;
        w.write_all(&cd_off.to_le_bytes())?;

        w.write_all(&EOCD64_LOCATOR_SIG.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?; // eocd64 disk
        w.write_all(&eocd64_off.to_le_bytes())?;
        w.write_all(&1u32.to_le_bytes())?; // total disks
    }

    let count16 = entries.min(u16::MAX as u64) as u16;
    w.write_all(&EOCD_SIG.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // this disk
    w.write_all(&0u16.to_le_bytes())?; // cd start disk
    w.write_all(&count16.to_le_bytes())?;
    w.write_all(&count16.to_le_bytes())?;
    w.write_all(&clamp32(cd_size, cd_size >= ZIP64_LIMIT).to_le_bytes())?;
    w.write_all(&clamp32(cd_off, cd_off >= ZIP64_LIMIT).to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // comment len
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le32(b: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(b[off..off + 4].try_into().unwrap())
    }
    fn le16(b: &[u8], off: usize) -> u16 {
        u16::from_le_bytes(b[off..off + 2].try_into().unwrap())
    }

    #[test]
    fn local_header_layout() {
        let h = LocalHeader {
            name: "docs/a.txt",
            method: Method::Deflate,
            flags: FLAG_STREAMED | FLAG_UTF8,
            dos_time: 0,
            dos_date: 0,
            crc32: 0,
            c_size: 0,
            u_size: 0,
            zip64: false,
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();

        assert_eq!(buf.len() as u64, h.encoded_len());
        assert_eq!(le32(&buf, 0), LOCAL_SIG);
        assert_eq!(le16(&buf, 4), 20); // version needed
        assert_eq!(le16(&buf, 6), FLAG_STREAMED | FLAG_UTF8);
        assert_eq!(le16(&buf, 8), 8); // method
        assert_eq!(le16(&buf, 26) as usize, "docs/a.txt".len());
        assert_eq!(le16(&buf, 28), 0); // no extra
        assert_eq!(&buf[30..], b"docs/a.txt");
    }

    #[test]
    fn zip64_local_header_carries_sentinels_and_extra() {
        let h = LocalHeader {
            name: "big.bin",
            method: Method::Store,
            flags: FLAG_STREAMED,
            dos_time: 0,
            dos_date: 0,
            crc32: 0,
            c_size: 0,
            u_size: 0,
            zip64: true,
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();

        assert_eq!(buf.len() as u64, h.encoded_len());
        assert_eq!(le16(&buf, 4), 45);
        assert_eq!(le32(&buf, 18), 0xFFFF_FFFF); // c_size sentinel
        assert_eq!(le32(&buf, 22), 0xFFFF_FFFF); // u_size sentinel
        let extra_off = 30 + "big.bin".len();
        assert_eq!(le16(&buf, extra_off), ZIP64_EXTRA_ID);
        assert_eq!(le16(&buf, extra_off + 2), 16);
    }

    #[test]
    fn descriptor_is_16_or_24_bytes() {
        let d = DataDescriptor {
            crc32: 0xDEADBEEF,
            c_size: 10,
            u_size: 20,
            zip64: false,
        };
        let mut buf = Vec::new();
        d.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(le32(&buf, 0), DESCRIPTOR_SIG);
        assert_eq!(le32(&buf, 4), 0xDEADBEEF);
        assert_eq!(le32(&buf, 8), 10);
        assert_eq!(le32(&buf, 12), 20);

        let mut buf = Vec::new();
        DataDescriptor { zip64: true, ..d }.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 24);
    }

    #[test]
    fn central_entry_layout_and_zip64_extra() {
        let e = CentralEntry {
            name: "a".into(),
            method: Method::Store,
            flags: FLAG_UTF8,
            dos_time: 0,
            dos_date: 0,
            crc32: 1,
            c_size: 2,
            u_size: 3,
            local_off: 4,
            external_attrs: unix_external_attrs(0o644, false),
            zip64_stream: false,
        };
        let mut buf = Vec::new();
        e.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, e.encoded_len());
        assert_eq!(le32(&buf, 0), CENTRAL_SIG);
        assert_eq!(le16(&buf, 6), 20); // version needed
        assert_eq!(le32(&buf, 42), 4); // local offset

        // only the overflowing field moves to the extra
        let big = CentralEntry {
            u_size: ZIP64_LIMIT + 1,
            ..e.clone()
        };
        let mut buf = Vec::new();
        big.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, big.encoded_len());
        assert_eq!(le16(&buf, 6), 45);
        assert_eq!(le32(&buf, 24), 0xFFFF_FFFF); // u_size slot
        assert_eq!(le32(&buf, 20), 2); // c_size stays inline
        let extra_off = 46 + 1;
        assert_eq!(le16(&buf, extra_off), ZIP64_EXTRA_ID);
        assert_eq!(le16(&buf, extra_off + 2), 8);
    }

    #[test]
    fn small_archive_gets_classic_eocd_only() {
        let mut buf = Vec::new();
        write_end_of_directory(&mut buf, 3, 100, 146).unwrap();
        assert_eq!(buf.len(), 22);
        assert_eq!(le32(&buf, 0), EOCD_SIG);
        assert_eq!(le16(&buf, 8), 3);
        assert_eq!(le32(&buf, 12), 146);
        assert_eq!(le32(&buf, 16), 100);
    }

    #[test]
    fn huge_offsets_emit_zip64_end_records() {
        let mut buf = Vec::new();
        write_end_of_directory(&mut buf, 3, ZIP64_LIMIT + 5, 146).unwrap();
        // eocd64 (56) + locator (20) + eocd (22)
        assert_eq!(buf.len(), 98);
        assert_eq!(le32(&buf, 0), EOCD64_SIG);
        assert_eq!(le32(&buf, 56), EOCD64_LOCATOR_SIG);
        assert_eq!(le32(&buf, 76), EOCD_SIG);
        // classic record holds the sentinel
        assert_eq!(le32(&buf, 76 + 16), 0xFFFF_FFFF);
    }
}
