//! ISO9660 directory index.
//!
//! Only the read side needed to serve files is implemented:
//!
//! 1. **Volume layer** - scan descriptors from sector 16 for the primary
//!    volume and an optional Joliet supplementary volume
//! 2. **Directory layer** - decode directory records extent by extent,
//!    caching each parsed listing for the lifetime of the index
//! 3. **Naming layer** - Rock Ridge `NM` names when the volume carries SUSP,
//!    else Joliet UCS-2 names, else translated ISO9660 identifiers
//!
//! File data itself is read through [`RangeHandle`](crate::RangeHandle).

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, TreeError};
use crate::range::SharedImage;

/// Size of a logical sector; directory records never straddle one.
pub const SECTOR_SIZE: u64 = 2048;

/// First sector of the volume descriptor set.
const DESCRIPTOR_START: u64 = 16;

/// Upper bound on descriptors scanned before giving up on a terminator.
const MAX_DESCRIPTORS: u64 = 64;

/// Upper bound on a single directory extent.
const MAX_DIRECTORY_BYTES: u64 = 32 * 1024 * 1024;

/// Upper bound on chained SUSP continuation areas per record.
const MAX_CONTINUATIONS: usize = 8;

const FLAG_DIRECTORY: u8 = 0x02;
const FLAG_MULTI_EXTENT: u8 = 0x80;

/// How entry names are derived from directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// Rock Ridge alternate names from SUSP `NM` entries.
    RockRidge,
    /// UCS-2 names from a Joliet supplementary volume.
    Joliet,
    /// ISO9660 identifiers with version suffix removed, lowercased.
    Plain,
}

/// A located file or directory inside the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name (no path separators).
    pub name: String,
    /// First logical block of the entry's data.
    pub extent: u32,
    /// Length of the entry's data in bytes.
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl ArchiveEntry {
    /// Absolute byte offset of the entry's data.
    pub fn offset(&self, block_size: u64) -> u64 {
        u64::from(self.extent) * block_size
    }
}

/// Parsed directory structure of one image.
#[derive(Debug)]
pub struct ArchiveIndex {
    image: Arc<SharedImage>,
    block_size: u64,
    naming: Naming,
    root: ArchiveEntry,
    /// SUSP bytes to skip at the start of each system use area.
    susp_skip: usize,
    /// Parsed listings keyed by directory extent.
    listings: RwLock<HashMap<u32, Arc<Vec<ArchiveEntry>>>>,
}

impl ArchiveIndex {
    /// Read the volume descriptors of `image` and prepare lookups.
    pub fn open(image: Arc<SharedImage>) -> Result<Self> {
        let invalid = |reason: String| TreeError::InvalidImage {
            path: image.path().display().to_string(),
            reason,
        };

        let mut primary = None;
        let mut joliet = None;
        for index in 0..MAX_DESCRIPTORS {
            let sector = image
                .read_vec_at((DESCRIPTOR_START + index) * SECTOR_SIZE, SECTOR_SIZE as usize)
                .map_err(|e| invalid(format!("cannot read volume descriptor {index}: {e}")))?;
            if &sector[1..6] != b"CD001" {
                return Err(invalid(format!(
                    "volume descriptor {index} lacks the CD001 identifier"
                )));
            }
            match sector[0] {
                1 if primary.is_none() => primary = Some(sector),
                2 if joliet.is_none() && is_joliet_escape(&sector[88..120]) => joliet = Some(sector),
                255 => break,
                _ => {}
            }
        }
        let primary = primary.ok_or_else(|| invalid("no primary volume descriptor".into()))?;

        let block_size = u64::from(le16(&primary[128..130]));
        if !block_size.is_power_of_two() || !(512..=SECTOR_SIZE).contains(&block_size) {
            return Err(invalid(format!("unsupported logical block size {block_size}")));
        }

        let root = root_entry(&primary[156..190]).map_err(invalid)?;
        let mut index = Self {
            image: Arc::clone(&image),
            block_size,
            naming: Naming::Plain,
            root,
            susp_skip: 0,
            listings: RwLock::new(HashMap::new()),
        };

        if let Some(skip) = index.detect_susp()? {
            index.naming = Naming::RockRidge;
            index.susp_skip = skip;
        } else if let Some(joliet) = joliet {
            index.root = root_entry(&joliet[156..190]).map_err(invalid)?;
            index.naming = Naming::Joliet;
        }

        debug!(
            image = %image.path().display(),
            naming = ?index.naming,
            block_size,
            "Opened ISO9660 index"
        );
        Ok(index)
    }

    /// Naming scheme in use.
    pub fn naming(&self) -> Naming {
        self.naming
    }

    /// Logical block size of the volume.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// The root directory entry.
    pub fn root(&self) -> &ArchiveEntry {
        &self.root
    }

    /// Find the entry at `path`.
    ///
    /// Returns [`TreeError::Malformed`] when a directory record on the way
    /// cannot be decoded.
    pub fn locate(&self, path: &str) -> Result<ArchiveEntry> {
        let segments = crate::split_path(path)?;
        let mut current = self.root.clone();
        for segment in segments {
            if !current.is_dir {
                return Err(TreeError::NotFound(path.to_string()));
            }
            let listing = self.listing(&current, path)?;
            current = listing
                .iter()
                .find(|entry| entry.name == segment)
                .cloned()
                .ok_or_else(|| TreeError::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Names of the direct children of the directory at `path`.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let entry = self.locate(path)?;
        if !entry.is_dir {
            return Err(TreeError::NotADirectory(path.to_string()));
        }
        let listing = self.listing(&entry, path)?;
        Ok(listing.iter().map(|entry| entry.name.clone()).collect())
    }

    fn listing(&self, dir: &ArchiveEntry, path: &str) -> Result<Arc<Vec<ArchiveEntry>>> {
        if let Some(cached) = self
            .listings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dir.extent)
        {
            return Ok(Arc::clone(cached));
        }

        let parsed = Arc::new(self.read_listing(dir, path)?);
        self.listings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dir.extent, Arc::clone(&parsed));
        Ok(parsed)
    }

    fn read_listing(&self, dir: &ArchiveEntry, path: &str) -> Result<Vec<ArchiveEntry>> {
        if dir.size > MAX_DIRECTORY_BYTES {
            return Err(TreeError::malformed(
                path,
                format!("directory extent of {} bytes", dir.size),
            ));
        }
        let data = self.read_at(dir.offset(self.block_size), dir.size as usize, path)?;

        let mut entries: Vec<ArchiveEntry> = Vec::new();
        // Multi-extent file being assembled, with the block its next part must start at.
        let mut pending: Option<(ArchiveEntry, u64)> = None;

        for record in Records::new(&data) {
            let record = record.map_err(|reason| TreeError::malformed(path, reason))?;
            if record.is_self_or_parent() {
                continue;
            }

            let mut entry = ArchiveEntry {
                name: String::new(),
                extent: record.extent,
                size: u64::from(record.size),
                is_dir: record.flags & FLAG_DIRECTORY != 0,
            };
            match self.naming {
                Naming::RockRidge => {
                    let fields = self.read_susp(record.system_use, path)?;
                    if fields.relocated {
                        continue;
                    }
                    if let Some(location) = fields.child_link {
                        entry.extent = location;
                        entry.size = self.directory_size(location, path)?;
                        entry.is_dir = true;
                    }
                    entry.name = fields
                        .name
                        .unwrap_or_else(|| translate_plain(record.identifier));
                }
                Naming::Joliet => entry.name = translate_joliet(record.identifier),
                Naming::Plain => entry.name = translate_plain(record.identifier),
            }
            if entry.name.is_empty() || entry.name.contains('/') {
                return Err(TreeError::malformed(
                    path,
                    format!("unusable entry name {:?}", entry.name),
                ));
            }

            let blocks = entry.size.div_ceil(self.block_size);
            match pending.take() {
                Some((mut head, next_block)) if head.name == entry.name => {
                    if u64::from(entry.extent) != next_block {
                        return Err(TreeError::malformed(
                            path,
                            format!("non-contiguous multi-extent file {}", entry.name),
                        ));
                    }
                    head.size += entry.size;
                    if record.flags & FLAG_MULTI_EXTENT != 0 {
                        pending = Some((head, next_block + blocks));
                    } else {
                        entries.push(head);
                    }
                    continue;
                }
                Some((head, _)) => {
                    return Err(TreeError::malformed(
                        path,
                        format!("multi-extent file {} has no final extent", head.name),
                    ));
                }
                None => {}
            }

            if record.flags & FLAG_MULTI_EXTENT != 0 {
                let next_block = u64::from(entry.extent) + blocks;
                pending = Some((entry, next_block));
            } else {
                entries.push(entry);
            }
        }

        if let Some((head, _)) = pending {
            return Err(TreeError::malformed(
                path,
                format!("multi-extent file {} has no final extent", head.name),
            ));
        }
        Ok(entries)
    }

    /// Check the root `.` record for a SUSP `SP` entry.
    fn detect_susp(&self) -> Result<Option<usize>> {
        let first = self.read_at(
            self.root.offset(self.block_size),
            SECTOR_SIZE.min(self.root.size) as usize,
            "/",
        )?;
        let Some(Ok(dot)) = Records::new(&first).next() else {
            return Ok(None);
        };
        let su = dot.system_use;
        if su.len() >= 7 && &su[0..2] == b"SP" && su[2] >= 7 && su[4] == 0xBE && su[5] == 0xEF {
            return Ok(Some(usize::from(su[6])));
        }
        Ok(None)
    }

    /// Data length of the directory starting at `extent`, read from its `.` record.
    fn directory_size(&self, extent: u32, path: &str) -> Result<u64> {
        let first = self.read_at(
            u64::from(extent) * self.block_size,
            SECTOR_SIZE as usize,
            path,
        )?;
        match Records::new(&first).next() {
            Some(Ok(dot)) if dot.is_self_or_parent() => Ok(u64::from(dot.size)),
            _ => Err(TreeError::malformed(path, "child link target has no . record")),
        }
    }

    fn read_susp(&self, area: &[u8], path: &str) -> Result<SuspFields> {
        let mut fields = SuspFields::default();
        let mut name = Vec::new();
        let mut area = area.get(self.susp_skip..).unwrap_or_default().to_vec();

        for _ in 0..=MAX_CONTINUATIONS {
            let mut continuation = None;
            let mut pos = 0;
            while pos + 4 <= area.len() {
                let signature = [area[pos], area[pos + 1]];
                let len = usize::from(area[pos + 2]);
                if signature == [0, 0] {
                    break;
                }
                if len < 4 || pos + len > area.len() {
                    return Err(TreeError::malformed(
                        path,
                        format!("SUSP entry {signature:?} overruns system use area"),
                    ));
                }
                let data = &area[pos + 4..pos + len];
                match &signature {
                    b"NM" => {
                        let Some((&flags, component)) = data.split_first() else {
                            return Err(TreeError::malformed(path, "empty NM entry"));
                        };
                        // CURRENT and PARENT flags name `.` and `..`.
                        if flags & 0x06 == 0 {
                            name.extend_from_slice(component);
                        }
                    }
                    b"CE" if data.len() >= 24 => {
                        let length = u64::from(le32(&data[16..20]));
                        if length > self.block_size {
                            return Err(TreeError::malformed(
                                path,
                                format!("continuation area of {length} bytes exceeds a block"),
                            ));
                        }
                        continuation = Some((
                            u64::from(le32(&data[0..4])),
                            u64::from(le32(&data[8..12])),
                            length as usize,
                        ));
                    }
                    b"CL" if data.len() >= 4 => fields.child_link = Some(le32(&data[0..4])),
                    b"RE" => fields.relocated = true,
                    b"ST" => break,
                    _ => {}
                }
                pos += len;
            }

            let Some((block, offset, length)) = continuation else {
                break;
            };
            area = self.read_at(block * self.block_size + offset, length, path)?;
        }

        if !name.is_empty() {
            fields.name = Some(String::from_utf8_lossy(&name).into_owned());
        }
        Ok(fields)
    }

    fn read_at(&self, pos: u64, len: usize, path: &str) -> Result<Vec<u8>> {
        self.image.read_vec_at(pos, len).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                TreeError::malformed(path, format!("extent at {pos} runs past end of image"))
            } else {
                TreeError::Io(e)
            }
        })
    }
}

#[derive(Debug, Default)]
struct SuspFields {
    name: Option<String>,
    relocated: bool,
    child_link: Option<u32>,
}

/// One decoded directory record.
#[derive(Debug)]
struct DirectoryRecord<'a> {
    extent: u32,
    size: u32,
    flags: u8,
    identifier: &'a [u8],
    system_use: &'a [u8],
}

impl DirectoryRecord<'_> {
    fn parse(buf: &[u8]) -> std::result::Result<DirectoryRecord<'_>, String> {
        let len = usize::from(buf[0]);
        if len < 34 || len > buf.len() {
            return Err(format!("directory record length {len} out of bounds"));
        }
        let ext_attr_len = u32::from(buf[1]);
        let name_len = usize::from(buf[32]);
        if 33 + name_len > len {
            return Err(format!("identifier of {name_len} bytes overruns record"));
        }
        let su_start = (33 + name_len + usize::from(name_len % 2 == 0)).min(len);
        let extent = le32(&buf[2..6])
            .checked_add(ext_attr_len)
            .ok_or("extent overflows")?;
        Ok(DirectoryRecord {
            extent,
            size: le32(&buf[10..14]),
            flags: buf[25],
            identifier: &buf[33..33 + name_len],
            system_use: &buf[su_start..len],
        })
    }

    fn is_self_or_parent(&self) -> bool {
        matches!(self.identifier, [0] | [1])
    }
}

/// Iterator over the records of a directory extent.
struct Records<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = std::result::Result<DirectoryRecord<'a>, String>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let len = usize::from(self.data[self.pos]);
            if len == 0 {
                // Zero padding runs to the next sector boundary.
                let sector = SECTOR_SIZE as usize;
                self.pos = (self.pos / sector + 1) * sector;
                continue;
            }
            let start = self.pos;
            self.pos += len;
            let record = DirectoryRecord::parse(&self.data[start..]);
            if record.is_err() {
                self.pos = self.data.len();
            }
            return Some(record);
        }
        None
    }
}

fn root_entry(record: &[u8]) -> std::result::Result<ArchiveEntry, String> {
    let root = DirectoryRecord::parse(record)?;
    if root.flags & FLAG_DIRECTORY == 0 {
        return Err("root directory record is not a directory".into());
    }
    Ok(ArchiveEntry {
        name: String::new(),
        extent: root.extent,
        size: u64::from(root.size),
        is_dir: true,
    })
}

fn is_joliet_escape(escape: &[u8]) -> bool {
    matches!(&escape[..3], b"%/@" | b"%/C" | b"%/E")
}

/// Translate an ISO9660 identifier: drop `;version`, a trailing `.`, lowercase.
fn translate_plain(identifier: &[u8]) -> String {
    let name = String::from_utf8_lossy(identifier);
    let name = name.split(';').next().unwrap_or_default();
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_lowercase()
}

fn translate_joliet(identifier: &[u8]) -> String {
    let units = identifier
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let name: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    match name.split_once(';') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

fn le16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn le32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
