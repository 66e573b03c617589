//! Red Hat and derivative installation trees.

use osboot_tree::Tree;

use crate::error::DistroError;
use crate::kind::{read_text, BootScript, Distro, DistroKind, UrlBuilder};
use crate::manifest::{Manifest, TreeInfo};

/// Any tree carrying a `.treeinfo` descriptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedHat;

impl DistroKind for RedHat {
    fn id(&self) -> &'static str {
        "redhat"
    }

    fn detect(&self, tree: &dyn Tree) -> bool {
        tree.exists(".treeinfo")
    }

    fn read_manifest(&self, tree: &dyn Tree) -> Manifest {
        Manifest::TreeInfo(TreeInfo::parse(&read_text(tree, ".treeinfo")))
    }

    fn boot_script(
        &self,
        _distro: &Distro,
        urls: &dyn UrlBuilder,
    ) -> Result<Option<BootScript>, DistroError> {
        let repo = urls.file_url("");
        Ok(Some(BootScript::ipxe([
            format!("kernel images/pxeboot/vmlinuz initrd=initrd.img repo={repo}"),
            "initrd images/pxeboot/initrd.img".to_string(),
            "boot".to_string(),
        ])))
    }
}
