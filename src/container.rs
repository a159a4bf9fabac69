//! Minimal streaming ZIP reader for the XLSX container
//!
//! Reads the central directory once, then serves individual parts either as
//! in-memory buffers (small metadata parts) or by streaming decompression to
//! a file on disk (worksheets, shared strings), so no large part is ever held
//! fully in memory.

use crate::error::{Result, XlsxError};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// Entry in the ZIP central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u64,
    pub compression_method: u16,
    pub offset: u64,
}

/// ZIP archive reader over a buffered file
pub struct ZipContainer {
    file: BufReader<File>,
    entries: Vec<ZipEntry>,
}

impl ZipContainer {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        let entries = read_central_directory(&mut file)?;
        Ok(ZipContainer { file, entries })
    }

    /// Find an entry by its archive-relative name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// True when the archive contains the named part
    pub fn has_entry(&self, name: &str) -> bool {
        self.find_entry(name).is_some()
    }

    /// Read a whole entry into memory; for small metadata parts only
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self.require(name)?;
        let mut reader = open_entry(&mut self.file, &entry)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Stream-decompress an entry into `target`, creating parent directories
    pub fn extract_entry(&mut self, name: &str, target: &Path) -> Result<()> {
        let entry = self.require(name)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut reader = open_entry(&mut self.file, &entry)?;
        let mut out = File::create(target)?;
        io::copy(&mut reader, &mut out)?;
        Ok(())
    }

    fn require(&self, name: &str) -> Result<ZipEntry> {
        self.find_entry(name)
            .cloned()
            .ok_or_else(|| XlsxError::Container(format!("entry not found: {}", name)))
    }
}

/// Fixed-size prefix of a local file header, up to the name/extra lengths
const LOCAL_HEADER_LEN: usize = 30;
/// End record without its trailing comment
const END_RECORD_LEN: u64 = 22;
/// Longest possible archive comment after the end record
const MAX_COMMENT_LEN: u64 = 65535;

/// Little-endian field cursor over one in-memory record
struct RecordCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        RecordCursor { data, pos: 0 }
    }

    fn field(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| XlsxError::Container("truncated archive record".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.field(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.field(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Position the file at an entry's data and wrap it in a decompressor
fn open_entry<'a>(
    file: &'a mut BufReader<File>,
    entry: &ZipEntry,
) -> Result<Box<dyn Read + 'a>> {
    file.seek(SeekFrom::Start(entry.offset))?;
    let mut header = [0u8; LOCAL_HEADER_LEN];
    file.read_exact(&mut header)?;

    let mut record = RecordCursor::new(&header);
    if record.u32()? != LOCAL_FILE_HEADER_SIGNATURE {
        return Err(XlsxError::Container(format!(
            "no local file header at offset {}",
            entry.offset
        )));
    }
    // Version through sizes; the central directory is authoritative
    record.field(22)?;
    let name_len = record.u16()? as i64;
    let extra_len = record.u16()? as i64;
    file.seek(SeekFrom::Current(name_len + extra_len))?;

    let data = file.take(entry.compressed_size);
    match entry.compression_method {
        8 => Ok(Box::new(DeflateDecoder::new(data))),
        0 => Ok(Box::new(data)),
        method => Err(XlsxError::Container(format!(
            "unsupported compression method: {}",
            method
        ))),
    }
}

/// Locate the end record in the file tail, then parse the central
/// directory it points at. Both records are read into memory once and
/// decoded with a field cursor.
fn read_central_directory(file: &mut BufReader<File>) -> Result<Vec<ZipEntry>> {
    let file_size = file.seek(SeekFrom::End(0))?;
    let tail_len = file_size.min(END_RECORD_LEN + MAX_COMMENT_LEN);
    file.seek(SeekFrom::Start(file_size - tail_len))?;
    let mut tail = vec![0u8; tail_len as usize];
    file.read_exact(&mut tail)?;

    let end_signature = END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();
    let end_record = tail
        .windows(4)
        .rposition(|window| window == end_signature.as_slice())
        .map(|start| &tail[start..])
        .ok_or_else(|| {
            XlsxError::Container("end of central directory not found".to_string())
        })?;

    let mut record = RecordCursor::new(end_record);
    record.field(4)?; // signature
    record.field(6)?; // disk numbers, entry count on this disk
    let entry_count = record.u16()? as usize;
    let directory_len = record.u32()? as u64;
    let directory_start = record.u32()? as u64;
    if directory_start + directory_len > file_size {
        return Err(XlsxError::Container(
            "central directory extends past end of file".to_string(),
        ));
    }

    file.seek(SeekFrom::Start(directory_start))?;
    let mut directory = vec![0u8; directory_len as usize];
    file.read_exact(&mut directory)?;

    let mut record = RecordCursor::new(&directory);
    let mut entries = Vec::with_capacity(entry_count);
    while entries.len() < entry_count {
        match record.u32() {
            Ok(CENTRAL_DIRECTORY_SIGNATURE) => {}
            _ => break,
        }
        entries.push(parse_directory_entry(&mut record)?);
    }
    Ok(entries)
}

/// Decode one central directory entry, cursor positioned after the
/// signature
fn parse_directory_entry(record: &mut RecordCursor) -> Result<ZipEntry> {
    record.field(6)?; // versions, flags
    let compression_method = record.u16()?;
    record.field(8)?; // mod time/date, CRC-32
    let compressed_size = record.u32()? as u64;
    record.field(4)?; // uncompressed size
    let name_len = record.u16()? as usize;
    let extra_len = record.u16()? as usize;
    let comment_len = record.u16()? as usize;
    record.field(8)?; // disk number, attributes
    let offset = record.u32()? as u64;
    let name = String::from_utf8_lossy(record.field(name_len)?).into_owned();
    record.field(extra_len + comment_len)?;

    Ok(ZipEntry {
        name,
        compressed_size,
        compression_method,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a stored-method single-entry ZIP by hand
    fn write_stored_zip(path: &Path, name: &str, data: &[u8]) {
        let mut bytes: Vec<u8> = Vec::new();
        let name_bytes = name.as_bytes();

        // Local file header
        bytes.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&20u16.to_le_bytes()); // version needed
        bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u16.to_le_bytes()); // method: stored
        bytes.extend_from_slice(&0u32.to_le_bytes()); // mod time/date
        bytes.extend_from_slice(&0u32.to_le_bytes()); // crc (unchecked)
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // extra len
        bytes.extend_from_slice(name_bytes);
        bytes.extend_from_slice(data);

        let cd_offset = bytes.len() as u32;

        // Central directory entry
        bytes.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&20u16.to_le_bytes()); // version made by
        bytes.extend_from_slice(&20u16.to_le_bytes()); // version needed
        bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
        bytes.extend_from_slice(&0u16.to_le_bytes()); // method
        bytes.extend_from_slice(&0u32.to_le_bytes()); // mod time/date
        bytes.extend_from_slice(&0u32.to_le_bytes()); // crc
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // extra len
        bytes.extend_from_slice(&0u16.to_le_bytes()); // comment len
        bytes.extend_from_slice(&0u16.to_le_bytes()); // disk number
        bytes.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        bytes.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        bytes.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        bytes.extend_from_slice(name_bytes);

        let cd_size = bytes.len() as u32 - cd_offset;

        // End of central directory
        bytes.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // disk number
        bytes.extend_from_slice(&0u16.to_le_bytes()); // cd start disk
        bytes.extend_from_slice(&1u16.to_le_bytes()); // entries on disk
        bytes.extend_from_slice(&1u16.to_le_bytes()); // total entries
        bytes.extend_from_slice(&cd_size.to_le_bytes());
        bytes.extend_from_slice(&cd_offset.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // comment len

        let mut file = File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    #[test]
    fn test_read_stored_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.zip");
        write_stored_zip(&path, "xl/workbook.xml", b"<workbook/>");

        let mut container = ZipContainer::open(&path).unwrap();
        assert!(container.has_entry("xl/workbook.xml"));
        assert!(!container.has_entry("xl/styles.xml"));
        let data = container.read_entry("xl/workbook.xml").unwrap();
        assert_eq!(data, b"<workbook/>");
    }

    #[test]
    fn test_extract_entry_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.zip");
        write_stored_zip(&path, "xl/worksheets/sheet1.xml", b"<worksheet/>");

        let mut container = ZipContainer::open(&path).unwrap();
        let target = dir.path().join("out/xl/worksheets/sheet1.xml");
        container
            .extract_entry("xl/worksheets/sheet1.xml", &target)
            .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"<worksheet/>");
    }

    #[test]
    fn test_missing_entry_is_container_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.zip");
        write_stored_zip(&path, "a.xml", b"x");

        let mut container = ZipContainer::open(&path).unwrap();
        assert!(matches!(
            container.read_entry("b.xml"),
            Err(XlsxError::Container(_))
        ));
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, b"this is not a zip archive").unwrap();
        assert!(matches!(
            ZipContainer::open(&path),
            Err(XlsxError::Container(_))
        ));
    }
}
