//! Bounded-memory shared-string store
//!
//! The shared-string part is scanned exactly once. Entries land in three
//! strata, checked in this order at lookup time: a RAM cache limited by a
//! byte budget, seek-optimized spill files holding one JSON-encoded string
//! per line, and as a last resort the original XML, re-read with a
//! sequential cursor and a single rewind.

use crate::error::{Result, XlsxError};
use crate::options::SharedStringOptions;
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const PART: &str = "sharedStrings.xml";
/// Per-entry cost estimate: string bytes plus container overhead
const ENTRY_OVERHEAD: usize = 24;
const CACHE_GROWTH_BLOCK: usize = 100;

/// One spill file covering a contiguous index range
struct SpillFile {
    path: PathBuf,
    count: usize,
    handle: Option<BufReader<File>>,
    /// Next line the kept handle would read
    cursor: usize,
}

/// Sequential cursor over the original shared-string XML
struct XmlCursor {
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
    next_index: usize,
}

pub struct SharedStringStore {
    xml_path: Option<PathBuf>,
    total: usize,
    cache: Vec<String>,
    spill: BTreeMap<usize, SpillFile>,
    opts: SharedStringOptions,
    fallback: Option<XmlCursor>,
    fallback_closed: bool,
}

/// In-progress spill file during the scan
struct SpillWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    first: usize,
    count: usize,
}

impl SharedStringStore {
    /// Store for a workbook without a shared-string part
    pub fn empty() -> Self {
        SharedStringStore {
            xml_path: None,
            total: 0,
            cache: Vec::new(),
            spill: BTreeMap::new(),
            opts: SharedStringOptions::default(),
            fallback: None,
            fallback_closed: false,
        }
    }

    /// Scan the shared-string XML once, filling cache and spill files
    pub fn scan(xml_path: &Path, spill_dir: &Path, opts: &SharedStringOptions) -> Result<Self> {
        let mut store = SharedStringStore {
            xml_path: Some(xml_path.to_path_buf()),
            total: 0,
            cache: Vec::new(),
            spill: BTreeMap::new(),
            opts: opts.clone(),
            fallback: None,
            fallback_closed: false,
        };

        let budget = (opts.cache_bytes_kb as usize) * 1024;
        let mut cached_bytes = 0usize;
        let mut writer: Option<SpillWriter> = None;

        let mut reader = open_xml(xml_path)?;
        let mut buf = Vec::new();

        while let Some(text) = next_entry(&mut reader, &mut buf)? {
            if opts.use_cache && cached_bytes < budget {
                cached_bytes += text.len() + ENTRY_OVERHEAD;
                if store.cache.len() == store.cache.capacity() {
                    store.cache.reserve_exact(CACHE_GROWTH_BLOCK);
                }
                store.cache.push(text);
            } else if opts.use_spill {
                if writer.is_none() {
                    writer = Some(SpillWriter::create(spill_dir, store.total)?);
                }
                if let Some(target) = writer.as_mut() {
                    let line =
                        serde_json::to_string(&text).map_err(|e| XlsxError::xml(PART, e))?;
                    target.writer.write_all(line.as_bytes())?;
                    target.writer.write_all(b"\n")?;
                    target.count += 1;
                }
                let rotate = writer
                    .as_ref()
                    .map_or(false, |w| w.count >= opts.spill_entries_per_file);
                if rotate {
                    if let Some(full) = writer.take() {
                        store.finish_spill(full)?;
                    }
                }
            }
            store.total += 1;
        }
        if let Some(pending) = writer.take() {
            store.finish_spill(pending)?;
        }

        debug!(
            "shared strings: {} entries, {} cached ({} bytes), {} spill files",
            store.total,
            store.cache.len(),
            cached_bytes,
            store.spill.len()
        );
        Ok(store)
    }

    fn finish_spill(&mut self, mut pending: SpillWriter) -> Result<()> {
        pending.writer.flush()?;
        self.spill.insert(
            pending.first,
            SpillFile {
                path: pending.path,
                count: pending.count,
                handle: None,
                cursor: 0,
            },
        );
        Ok(())
    }

    /// Number of unique strings seen during the scan
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of entries retained in RAM
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Look up a shared string by index. Out-of-range indexes and fallback
    /// failures yield an empty string; lookups never fail hard.
    pub fn get(&mut self, index: usize) -> String {
        if index >= self.total {
            return String::new();
        }
        if index < self.cache.len() {
            return self.cache[index].clone();
        }
        if let Some(text) = self.get_from_spill(index) {
            return text;
        }
        self.get_from_xml(index)
    }

    fn get_from_spill(&mut self, index: usize) -> Option<String> {
        let keep_handles = self.opts.keep_handles;
        let (&first, spill) = self.spill.range_mut(..=index).next_back()?;
        let line_index = index - first;
        if line_index >= spill.count {
            return None;
        }

        let mut handle = match spill.handle.take() {
            Some(handle) => handle,
            None => {
                spill.cursor = 0;
                BufReader::new(File::open(&spill.path).ok()?)
            }
        };
        if spill.cursor > line_index {
            handle.seek(SeekFrom::Start(0)).ok()?;
            spill.cursor = 0;
        }

        let mut line = String::new();
        while spill.cursor <= line_index {
            line.clear();
            if handle.read_line(&mut line).ok()? == 0 {
                return None;
            }
            spill.cursor += 1;
        }
        if keep_handles {
            spill.handle = Some(handle);
        }
        serde_json::from_str(line.trim_end()).ok()
    }

    fn get_from_xml(&mut self, index: usize) -> String {
        if self.fallback_closed {
            return String::new();
        }
        let Some(xml_path) = self.xml_path.clone() else {
            return String::new();
        };

        let needs_rewind = match &self.fallback {
            Some(cursor) => cursor.next_index > index,
            None => true,
        };
        if needs_rewind {
            match open_xml(&xml_path) {
                Ok(reader) => {
                    self.fallback = Some(XmlCursor {
                        reader,
                        buf: Vec::new(),
                        next_index: 0,
                    })
                }
                Err(_) => {
                    self.fallback_closed = true;
                    return String::new();
                }
            }
        }

        let cursor = match self.fallback.as_mut() {
            Some(cursor) => cursor,
            None => return String::new(),
        };
        loop {
            match next_entry(&mut cursor.reader, &mut cursor.buf) {
                Ok(Some(text)) => {
                    cursor.next_index += 1;
                    if cursor.next_index > index {
                        return text;
                    }
                }
                Ok(None) | Err(_) => {
                    warn!("shared string {} missing from {}", index, PART);
                    self.fallback = None;
                    self.fallback_closed = true;
                    return String::new();
                }
            }
        }
    }

    /// Release handles and remove every spill file
    pub fn close(&mut self) {
        for spill in self.spill.values_mut() {
            spill.handle = None;
            let _ = std::fs::remove_file(&spill.path);
        }
        self.spill.clear();
        self.fallback = None;
        self.fallback_closed = true;
    }
}

impl Drop for SharedStringStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl SpillWriter {
    fn create(spill_dir: &Path, first: usize) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(&format!("shared_strings_tmp_{}_", first))
            .suffix(".txt")
            .tempfile_in(spill_dir)?;
        let (file, path) = file.keep().map_err(|e| XlsxError::Io(e.error))?;
        Ok(SpillWriter {
            path,
            writer: BufWriter::new(file),
            first,
            count: 0,
        })
    }
}

fn open_xml(path: &Path) -> Result<Reader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Reader::from_reader(BufReader::new(file)))
}

/// Advance to the next `si` element and concatenate its `t` descendants
fn next_entry<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Option<String>> {
    let mut text = String::new();
    let mut in_si = false;
    let mut in_t = false;
    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => in_si = true,
                b"t" if in_si => in_t = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" if in_si => return Ok(Some(text)),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Text(t)) if in_t => {
                let chunk = t.unescape().map_err(|e| XlsxError::xml(PART, e))?;
                text.push_str(&chunk);
            }
            // A self-closing <si/> is still one (empty) entry
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                return Ok(Some(String::new()))
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(XlsxError::xml(PART, e)),
            _ => {}
        }
    }
}
