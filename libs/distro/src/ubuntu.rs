//! Ubuntu installer and live media.

use osboot_tree::Tree;

use crate::debian::Debian;
use crate::error::DistroError;
use crate::kind::{read_text, BootScript, Distro, DistroKind, UrlBuilder};
use crate::manifest::{Definitions, Manifest};

/// Any tree carrying `README.diskdefines`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ubuntu;

impl DistroKind for Ubuntu {
    fn id(&self) -> &'static str {
        "ubuntu"
    }

    fn parent(&self) -> Option<&'static str> {
        Some(Debian.id())
    }

    fn detect(&self, tree: &dyn Tree) -> bool {
        tree.exists("README.diskdefines")
    }

    fn read_manifest(&self, tree: &dyn Tree) -> Manifest {
        Manifest::Definitions(Definitions::parse(&read_text(tree, "README.diskdefines")))
    }
}

/// Alternate installer media shipping a netboot tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct UbuntuNetboot;

impl DistroKind for UbuntuNetboot {
    fn id(&self) -> &'static str {
        "ubuntu-netboot"
    }

    fn parent(&self) -> Option<&'static str> {
        Some(Ubuntu.id())
    }

    fn detect(&self, tree: &dyn Tree) -> bool {
        Ubuntu.detect(tree) && tree.exists("install/netboot")
    }

    fn read_manifest(&self, tree: &dyn Tree) -> Manifest {
        Ubuntu.read_manifest(tree)
    }

    fn boot_script(
        &self,
        distro: &Distro,
        _urls: &dyn UrlBuilder,
    ) -> Result<Option<BootScript>, DistroError> {
        let arch = distro
            .manifest()
            .definitions()
            .map(|defs| defs.get("ARCH"))
            .unwrap_or_default();
        let installer = format!("install/netboot/ubuntu-installer/{arch}");
        Ok(Some(BootScript::ipxe([
            format!("kernel {installer}/linux initrd=initrd.gz"),
            format!("initrd {installer}/initrd.gz"),
            "boot".to_string(),
        ])))
    }
}

/// Desktop live media booted with casper.
#[derive(Debug, Default, Clone, Copy)]
pub struct UbuntuLive;

impl DistroKind for UbuntuLive {
    fn id(&self) -> &'static str {
        "ubuntu-live"
    }

    fn parent(&self) -> Option<&'static str> {
        Some(Ubuntu.id())
    }

    fn detect(&self, tree: &dyn Tree) -> bool {
        Ubuntu.detect(tree) && tree.exists("casper")
    }

    fn read_manifest(&self, tree: &dyn Tree) -> Manifest {
        Ubuntu.read_manifest(tree)
    }

    fn boot_script(
        &self,
        _distro: &Distro,
        _urls: &dyn UrlBuilder,
    ) -> Result<Option<BootScript>, DistroError> {
        Ok(Some(BootScript::ipxe([
            "kernel casper/vmlinuz.efi initrd=initrd.lz boot=casper \
             live-media=/lib/casper live-media-path=/",
            "initrd casper/initrd.lz",
            "initrd casper/filesystem.squashfs /lib/casper/filesystem.squashfs",
            "boot",
        ])))
    }
}
