//! Minimal ISO9660 image writer for tests.
//!
//! Produces images with one primary volume and, optionally, Rock Ridge
//! alternate names or a Joliet supplementary volume. Path tables, dates and
//! other metadata the index never reads are left zeroed.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

const SECTOR: usize = 2048;

#[derive(Debug, Default, Clone)]
struct Dir {
    children: BTreeMap<String, Node>,
}

#[derive(Debug, Clone)]
enum Node {
    Dir(Dir),
    File(Vec<u8>),
}

/// Names written into directory records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hierarchy {
    /// Primary volume, optionally with Rock Ridge `NM` entries.
    Primary { rock_ridge: bool },
    /// Joliet supplementary volume.
    Joliet,
}

/// Builder for in-memory ISO9660 images.
///
/// ```ignore
/// let image = IsoBuilder::new()
///     .rock_ridge()
///     .file(".treeinfo", "[general]\nfamily=ExampleOS\nversion=9\n")
///     .dir("images/pxeboot")
///     .write_temp()?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct IsoBuilder {
    root: Dir,
    rock_ridge: bool,
    joliet: bool,
}

/// Child of a directory in a flattened hierarchy.
#[derive(Debug, Clone, Copy)]
enum ChildRef {
    Dir(usize),
    File(usize),
}

#[derive(Debug)]
struct DirLayout {
    parent: usize,
    children: Vec<(String, ChildRef)>,
    lba: u32,
    size: u32,
}

impl IsoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write Rock Ridge names (preserving case and punctuation).
    pub fn rock_ridge(mut self) -> Self {
        self.rock_ridge = true;
        self
    }

    /// Add a Joliet supplementary volume.
    pub fn joliet(mut self) -> Self {
        self.joliet = true;
        self
    }

    /// Add a directory, creating parents as needed.
    pub fn dir(mut self, path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = &mut self.root;
        for segment in segments {
            current = match current
                .children
                .entry(segment.to_string())
                .or_insert_with(|| Node::Dir(Dir::default()))
            {
                Node::Dir(dir) => dir,
                Node::File(_) => panic!("{segment} in {path} is a file"),
            };
        }
        self
    }

    /// Add a file, creating parent directories as needed.
    pub fn file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        self = self.dir(parent);
        let mut current = &mut self.root;
        for segment in parent.split('/').filter(|s| !s.is_empty()) {
            current = match current.children.get_mut(segment) {
                Some(Node::Dir(dir)) => dir,
                _ => unreachable!("parent directories were just created"),
            };
        }
        current
            .children
            .insert(name.to_string(), Node::File(contents.into()));
        self
    }

    /// Serialize the image.
    pub fn build(&self) -> Vec<u8> {
        let mut files: Vec<&[u8]> = Vec::new();
        let mut primary = flatten(&self.root, &mut files);
        let mut joliet = if self.joliet {
            let mut ignored = Vec::new();
            Some(flatten(&self.root, &mut ignored))
        } else {
            None
        };

        let primary_kind = Hierarchy::Primary {
            rock_ridge: self.rock_ridge,
        };
        size_directories(&mut primary, primary_kind);
        if let Some(joliet) = joliet.as_mut() {
            size_directories(joliet, Hierarchy::Joliet);
        }

        // 16 system sectors, primary descriptor, optional Joliet, terminator.
        let mut next_lba = 16 + 1 + u32::from(self.joliet) + 1;
        for dir in primary.iter_mut().chain(joliet.iter_mut().flatten()) {
            dir.lba = next_lba;
            next_lba += dir.size / SECTOR as u32;
        }
        let mut file_lbas = Vec::with_capacity(files.len());
        for data in &files {
            file_lbas.push(next_lba);
            next_lba += data.len().div_ceil(SECTOR) as u32;
        }

        let mut image = vec![0u8; next_lba as usize * SECTOR];
        write_descriptor(&mut image, 16, 1, &primary[0], next_lba);
        let mut terminator = 17;
        if let Some(joliet) = joliet.as_ref() {
            write_descriptor(&mut image, 17, 2, &joliet[0], next_lba);
            terminator = 18;
        }
        let at = terminator * SECTOR;
        image[at] = 255;
        image[at + 1..at + 6].copy_from_slice(b"CD001");
        image[at + 6] = 1;

        write_directories(&mut image, &primary, primary_kind, &files, &file_lbas);
        if let Some(joliet) = joliet.as_ref() {
            write_directories(&mut image, joliet, Hierarchy::Joliet, &files, &file_lbas);
        }
        for (data, lba) in files.iter().zip(&file_lbas) {
            let at = *lba as usize * SECTOR;
            image[at..at + data.len()].copy_from_slice(data);
        }
        image
    }

    /// Write the image to `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.build())
    }

    /// Write the image to a temporary `.iso` file.
    pub fn write_temp(&self) -> io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new().suffix(".iso").tempfile()?;
        file.write_all(&self.build())?;
        file.flush()?;
        Ok(file)
    }
}

/// Breadth-first flattening; index 0 is the root.
fn flatten<'a>(root: &'a Dir, files: &mut Vec<&'a [u8]>) -> Vec<DirLayout> {
    let mut layouts = Vec::new();
    let mut queue = VecDeque::from([(root, 0usize)]);
    while let Some((dir, parent)) = queue.pop_front() {
        let index = layouts.len();
        layouts.push(DirLayout {
            parent,
            children: Vec::new(),
            lba: 0,
            size: 0,
        });
        for (name, node) in &dir.children {
            let child = match node {
                Node::Dir(child) => {
                    queue.push_back((child, index));
                    // Resolved below once the child's index is known.
                    ChildRef::Dir(usize::MAX)
                }
                Node::File(data) => {
                    files.push(data);
                    ChildRef::File(files.len() - 1)
                }
            };
            layouts[index].children.push((name.clone(), child));
        }
    }

    // Breadth-first order means a directory's children appear in the order
    // they were queued, after every directory queued before them.
    let mut next_child = 1;
    for layout in layouts.iter_mut() {
        for (_, child) in layout.children.iter_mut() {
            if let ChildRef::Dir(slot) = child {
                *slot = next_child;
                next_child += 1;
            }
        }
    }
    layouts
}

fn size_directories(dirs: &mut [DirLayout], hierarchy: Hierarchy) {
    for index in 0..dirs.len() {
        let records = directory_records(dirs, index, hierarchy, &[], &[]);
        dirs[index].size = pack(&records).len() as u32;
    }
}

fn write_directories(
    image: &mut [u8],
    dirs: &[DirLayout],
    hierarchy: Hierarchy,
    files: &[&[u8]],
    file_lbas: &[u32],
) {
    for index in 0..dirs.len() {
        let records = directory_records(dirs, index, hierarchy, files, file_lbas);
        let packed = pack(&records);
        let at = dirs[index].lba as usize * SECTOR;
        image[at..at + packed.len()].copy_from_slice(&packed);
    }
}

/// Records of one directory. With empty `files`, locations are placeholders.
fn directory_records(
    dirs: &[DirLayout],
    index: usize,
    hierarchy: Hierarchy,
    files: &[&[u8]],
    file_lbas: &[u32],
) -> Vec<Vec<u8>> {
    let dir = &dirs[index];
    let parent = &dirs[dir.parent];
    let dot_su: &[u8] = match hierarchy {
        Hierarchy::Primary { rock_ridge: true } if index == 0 => &[b'S', b'P', 7, 1, 0xBE, 0xEF, 0],
        _ => &[],
    };

    let mut records = vec![
        record(&[0], dir.lba, dir.size, true, dot_su),
        record(&[1], parent.lba, parent.size, true, &[]),
    ];
    for (name, child) in &dir.children {
        let (lba, size, is_dir) = match *child {
            ChildRef::Dir(child) => (dirs[child].lba, dirs[child].size, true),
            ChildRef::File(file) => match (files.get(file), file_lbas.get(file)) {
                (Some(data), Some(lba)) => (*lba, data.len() as u32, false),
                _ => (0, 0, false),
            },
        };
        let (identifier, system_use) = match hierarchy {
            Hierarchy::Primary { rock_ridge } => {
                let su = if rock_ridge {
                    let mut nm = vec![b'N', b'M', (5 + name.len()) as u8, 1, 0];
                    nm.extend_from_slice(name.as_bytes());
                    nm
                } else {
                    Vec::new()
                };
                (iso_identifier(name, is_dir), su)
            }
            Hierarchy::Joliet => {
                let mut joliet_name = name.clone();
                if !is_dir {
                    joliet_name.push_str(";1");
                }
                let encoded: Vec<u8> = joliet_name
                    .encode_utf16()
                    .flat_map(|unit| unit.to_be_bytes())
                    .collect();
                (encoded, Vec::new())
            }
        };
        records.push(record(&identifier, lba, size, is_dir, &system_use));
    }
    records
}

/// Pack records into whole sectors without straddling a boundary.
fn pack(records: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut used = 0;
    for record in records {
        if used + record.len() > SECTOR {
            out.resize(out.len() + (SECTOR - used), 0);
            used = 0;
        }
        out.extend_from_slice(record);
        used += record.len();
    }
    out.resize(out.len().div_ceil(SECTOR).max(1) * SECTOR, 0);
    out
}

fn record(identifier: &[u8], lba: u32, size: u32, is_dir: bool, system_use: &[u8]) -> Vec<u8> {
    let pad = usize::from(identifier.len() % 2 == 0);
    let mut len = 33 + identifier.len() + pad + system_use.len();
    len += len % 2;
    assert!(len <= 255, "directory record too long");

    let mut buf = vec![0u8; len];
    buf[0] = len as u8;
    both_u32(&mut buf[2..10], lba);
    both_u32(&mut buf[10..18], size);
    buf[25] = if is_dir { 0x02 } else { 0 };
    both_u16(&mut buf[28..32], 1);
    buf[32] = identifier.len() as u8;
    buf[33..33 + identifier.len()].copy_from_slice(identifier);
    let su_start = 33 + identifier.len() + pad;
    buf[su_start..su_start + system_use.len()].copy_from_slice(system_use);
    buf
}

/// Uppercase d-characters, `NAME.EXT;1` for files.
fn iso_identifier(name: &str, is_dir: bool) -> Vec<u8> {
    let mut identifier: String = name
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            c @ ('A'..='Z' | '0'..='9' | '_') => c,
            '.' if !is_dir => '.',
            _ => '_',
        })
        .collect();
    if !is_dir {
        if !identifier.contains('.') {
            identifier.push('.');
        }
        identifier.push_str(";1");
    }
    identifier.into_bytes()
}

fn write_descriptor(image: &mut [u8], sector: usize, kind: u8, root: &DirLayout, total: u32) {
    let at = sector * SECTOR;
    let descriptor = &mut image[at..at + SECTOR];
    descriptor[0] = kind;
    descriptor[1..6].copy_from_slice(b"CD001");
    descriptor[6] = 1;
    descriptor[8..72].fill(b' ');
    descriptor[40..51].copy_from_slice(b"OSBOOT_TEST");
    both_u32(&mut descriptor[80..88], total);
    if kind == 2 {
        descriptor[88..91].copy_from_slice(b"%/E");
    }
    both_u16(&mut descriptor[120..124], 1);
    both_u16(&mut descriptor[124..128], 1);
    both_u16(&mut descriptor[128..132], SECTOR as u16);
    let root_record = record(&[0], root.lba, root.size, true, &[]);
    descriptor[156..190].copy_from_slice(&root_record);
    descriptor[881] = 1;
}

fn both_u16(buf: &mut [u8], value: u16) {
    buf[0..2].copy_from_slice(&value.to_le_bytes());
    buf[2..4].copy_from_slice(&value.to_be_bytes());
}

fn both_u32(buf: &mut [u8], value: u32) {
    buf[0..4].copy_from_slice(&value.to_le_bytes());
    buf[4..8].copy_from_slice(&value.to_be_bytes());
}
