//! Distribution metadata files.
//!
//! Three formats are understood:
//!
//! | Format      | File                 | Example                                   |
//! |-------------|----------------------|-------------------------------------------|
//! | header line | `.disk/info`         | `Debian GNU/Linux 9.4.0 "Stretch" - ...`   |
//! | definitions | `README.diskdefines` | `#define DISKNAME  Ubuntu 18.04 LTS`      |
//! | INI         | `.treeinfo`          | `[general]` `family = Fedora`             |
//!
//! Parsing never fails: unreadable input yields empty fields.

use std::collections::HashMap;
use std::sync::LazyLock;

use config::{Config, File, FileFormat};
use regex::Regex;
use tracing::warn;

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>.+?)\s+(?P<version>\d[\d.]*)").expect("header pattern is valid")
});

static DEFINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#define\s+(?P<key>\w+)\s+(?P<value>.+?)\s*$")
        .expect("define pattern is valid")
});

/// Name and version from a single-line disk header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskInfo {
    pub name: String,
    pub version: String,
}

impl DiskInfo {
    /// Split `text` at the first whitespace run followed by a digit.
    pub fn parse(text: &str) -> Self {
        let Some(captures) = HEADER.captures(text) else {
            return Self::default();
        };
        Self {
            name: captures["name"].to_string(),
            version: captures["version"].to_string(),
        }
    }
}

/// `#define KEY value` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Definitions {
    values: HashMap<String, String>,
}

impl Definitions {
    pub fn parse(text: &str) -> Self {
        let values = text
            .lines()
            .filter_map(|line| DEFINE.captures(line))
            .map(|captures| (captures["key"].to_string(), captures["value"].to_string()))
            .collect();
        Self { values }
    }

    /// Value of `key`, or `""` when undefined.
    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// INI tree descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeInfo {
    sections: HashMap<String, HashMap<String, String>>,
}

impl TreeInfo {
    pub fn parse(text: &str) -> Self {
        let sections = Config::builder()
            .add_source(File::from_str(text, FileFormat::Ini))
            .build()
            .and_then(|config| config.try_deserialize::<HashMap<String, HashMap<String, String>>>());
        match sections {
            Ok(sections) => Self { sections },
            Err(error) => {
                warn!(error = %error, "Unparseable tree descriptor, ignoring");
                Self::default()
            }
        }
    }

    /// Value of `key` in `section`, or `""`.
    pub fn get(&self, section: &str, key: &str) -> &str {
        self.sections
            .get(section)
            .and_then(|values| values.get(key))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// `[release] name`, else `[general] family`.
    pub fn name(&self) -> &str {
        if self.has_section("release") {
            self.get("release", "name")
        } else {
            self.get("general", "family")
        }
    }

    /// `[release] version`, else `[general] version`.
    pub fn version(&self) -> &str {
        if self.has_section("release") {
            self.get("release", "version")
        } else {
            self.get("general", "version")
        }
    }
}

/// Parsed metadata of one distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    DiskInfo(DiskInfo),
    Definitions(Definitions),
    TreeInfo(TreeInfo),
}

impl Manifest {
    /// Distribution name, e.g. `Fedora`.
    pub fn name(&self) -> &str {
        match self {
            Self::DiskInfo(info) => &info.name,
            Self::Definitions(defs) => {
                let disk_name = defs.get("DISKNAME");
                disk_name
                    .split_once(' ')
                    .map_or(disk_name, |(name, _)| name)
            }
            Self::TreeInfo(info) => info.name(),
        }
    }

    /// Distribution version, e.g. `26`.
    pub fn version(&self) -> &str {
        match self {
            Self::DiskInfo(info) => &info.version,
            Self::Definitions(defs) => {
                let disk_name = defs.get("DISKNAME");
                disk_name
                    .split_once(' ')
                    .map_or(disk_name, |(_, version)| version)
            }
            Self::TreeInfo(info) => info.version(),
        }
    }

    pub fn definitions(&self) -> Option<&Definitions> {
        match self {
            Self::Definitions(defs) => Some(defs),
            _ => None,
        }
    }
}
