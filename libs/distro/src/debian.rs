//! Debian and Debian live media.

use osboot_tree::Tree;

use crate::error::DistroError;
use crate::kind::{read_text, BootScript, Distro, DistroKind, UrlBuilder};
use crate::manifest::{DiskInfo, Manifest};

/// Any tree carrying `.disk/info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Debian;

impl DistroKind for Debian {
    fn id(&self) -> &'static str {
        "debian"
    }

    fn detect(&self, tree: &dyn Tree) -> bool {
        tree.exists(".disk/info")
    }

    fn read_manifest(&self, tree: &dyn Tree) -> Manifest {
        Manifest::DiskInfo(DiskInfo::parse(&read_text(tree, ".disk/info")))
    }
}

/// Debian live images, booted from `live/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebianLive;

impl DistroKind for DebianLive {
    fn id(&self) -> &'static str {
        "debian-live"
    }

    fn parent(&self) -> Option<&'static str> {
        Some(Debian.id())
    }

    fn detect(&self, tree: &dyn Tree) -> bool {
        Debian.detect(tree) && tree.exists("live")
    }

    fn read_manifest(&self, tree: &dyn Tree) -> Manifest {
        Debian.read_manifest(tree)
    }

    fn boot_script(
        &self,
        distro: &Distro,
        urls: &dyn UrlBuilder,
    ) -> Result<Option<BootScript>, DistroError> {
        let tree = distro.tree();
        let kernel = first_match(tree.as_ref(), "live/vmlinuz-*", "live/vmlinuz")?;
        let initrd = first_match(tree.as_ref(), "live/initrd.img-*", "live/initrd.img")?;
        let squashfs = urls.file_url("live/filesystem.squashfs");
        Ok(Some(BootScript::ipxe([
            format!("kernel {kernel} initrd=initrd.img boot=live fetch={squashfs}"),
            format!("initrd -n initrd.img {initrd}"),
            "boot".to_string(),
        ])))
    }
}

fn first_match(tree: &dyn Tree, pattern: &str, fallback: &str) -> Result<String, DistroError> {
    Ok(tree
        .glob(pattern)?
        .into_iter()
        .next()
        .unwrap_or_else(|| fallback.to_string()))
}
