use std::sync::Arc;

use osboot_distro::manifest::{Definitions, DiskInfo, TreeInfo};
use osboot_distro::{DetectionCascade, Distro, UrlBuilder};
use osboot_testing::{IsoBuilder, MemoryTree};
use osboot_tree::{ArchiveTree, Tree};
use rstest::rstest;

struct Urls(&'static str);

impl UrlBuilder for Urls {
    fn file_url(&self, path: &str) -> String {
        format!("{}/{path}", self.0)
    }
}

const DEBIAN_INFO: &str = "Debian GNU/Linux 9.4.0 \"Stretch\" - Official amd64 LIVE Binary";
const UBUNTU_DEFINES: &str = "#define DISKNAME  Ubuntu-Server 18.04.1 LTS \"Bionic Beaver\" - Release amd64\n\
#define TYPE  binary\n\
#define TYPEbinary  1\n\
#define ARCH  amd64\n\
#define ARCHamd64  1\n\
#define DISKNUM  1\n";

fn detect(tree: impl Tree + 'static) -> Option<Distro> {
    DetectionCascade::standard().detect(Arc::new(tree))
}

fn kind_of(tree: impl Tree + 'static) -> Option<&'static str> {
    detect(tree).map(|distro| distro.kind().id())
}

#[rstest]
#[case::debian(MemoryTree::new().file(".disk/info", DEBIAN_INFO), Some("debian"))]
#[case::debian_live(
    MemoryTree::new().file(".disk/info", DEBIAN_INFO).dir("live"),
    Some("debian-live")
)]
#[case::ubuntu(MemoryTree::new().file("README.diskdefines", UBUNTU_DEFINES), Some("ubuntu"))]
#[case::ubuntu_netboot(
    MemoryTree::new()
        .file("README.diskdefines", UBUNTU_DEFINES)
        .dir("install/netboot"),
    Some("ubuntu-netboot")
)]
#[case::ubuntu_live(
    MemoryTree::new().file("README.diskdefines", UBUNTU_DEFINES).dir("casper"),
    Some("ubuntu-live")
)]
#[case::redhat(MemoryTree::new().file(".treeinfo", "[general]\n"), Some("redhat"))]
#[case::nothing(MemoryTree::new().file("README", "hello"), None)]
#[case::live_dir_alone(MemoryTree::new().dir("live"), None)]
fn test_cascade_picks_most_specific(#[case] tree: MemoryTree, #[case] expected: Option<&str>) {
    assert_eq!(kind_of(tree), expected);
}

#[test]
fn test_all_matches_are_reported() {
    let tree = MemoryTree::new()
        .file(".disk/info", DEBIAN_INFO)
        .file("README.diskdefines", UBUNTU_DEFINES)
        .dir("casper");
    assert_eq!(
        DetectionCascade::standard().matches(&tree),
        vec!["ubuntu-live", "ubuntu", "debian"]
    );
}

#[rstest]
#[case::general("[general]\nfamily = ExampleOS\nversion = 9\n", "ExampleOS", "9")]
#[case::release_wins(
    "[general]\nfamily = Fedora\nversion = 26\n\n[release]\nname = Fedora Server\nversion = 26.1\n",
    "Fedora Server",
    "26.1"
)]
#[case::release_without_version("[release]\nname = CentOS\n", "CentOS", "")]
#[case::empty("", "", "")]
fn test_treeinfo(#[case] text: &str, #[case] name: &str, #[case] version: &str) {
    let info = TreeInfo::parse(text);
    assert_eq!(info.name(), name);
    assert_eq!(info.version(), version);
}

#[rstest]
#[case::debian(DEBIAN_INFO, "Debian GNU/Linux", "9.4.0")]
#[case::digit_in_name("Foo2 Linux 3.1 beta", "Foo2 Linux", "3.1")]
#[case::no_version("Debian GNU/Linux testing", "", "")]
fn test_disk_info(#[case] text: &str, #[case] name: &str, #[case] version: &str) {
    let info = DiskInfo::parse(text);
    assert_eq!(info.name, name);
    assert_eq!(info.version, version);
}

#[test]
fn test_definitions_lookup() {
    let defs = Definitions::parse("#define ARCH amd64\n");
    assert_eq!(defs.get("ARCH"), "amd64");
    assert_eq!(defs.get("DISKNAME"), "");
}

#[test]
fn test_redhat_from_image() {
    let image = IsoBuilder::new()
        .rock_ridge()
        .file(".treeinfo", "[general]\nfamily = ExampleOS\nversion = 9\n")
        .file("images/pxeboot/vmlinuz", "k")
        .file("images/pxeboot/initrd.img", "i")
        .write_temp()
        .unwrap();
    let distro = detect(ArchiveTree::open(image.path()).unwrap()).unwrap();

    assert_eq!(distro.kind().id(), "redhat");
    assert_eq!(distro.name(), "ExampleOS");
    assert_eq!(distro.version(), "9");
    let script = distro
        .boot_script(&Urls("http://boot.example/isos/example-9"))
        .unwrap()
        .unwrap();
    assert_eq!(
        script.as_str(),
        "#!ipxe\n\
         kernel images/pxeboot/vmlinuz initrd=initrd.img repo=http://boot.example/isos/example-9/\n\
         initrd images/pxeboot/initrd.img\n\
         boot\n"
    );
}

#[test]
fn test_debian_live_script_uses_versioned_files() {
    let distro = detect(
        MemoryTree::new()
            .file(".disk/info", DEBIAN_INFO)
            .file("live/vmlinuz-4.9.0-6-amd64", "k")
            .file("live/initrd.img-4.9.0-6-amd64", "i")
            .file("live/filesystem.squashfs", "s"),
    )
    .unwrap();

    assert_eq!(distro.name(), "Debian GNU/Linux");
    assert_eq!(distro.version(), "9.4.0");
    let script = distro.boot_script(&Urls("http://h/debian")).unwrap().unwrap();
    assert_eq!(
        script.as_str(),
        "#!ipxe\n\
         kernel live/vmlinuz-4.9.0-6-amd64 initrd=initrd.img boot=live fetch=http://h/debian/live/filesystem.squashfs\n\
         initrd -n initrd.img live/initrd.img-4.9.0-6-amd64\n\
         boot\n"
    );
}

#[test]
fn test_debian_live_script_falls_back() {
    let distro = detect(MemoryTree::new().file(".disk/info", DEBIAN_INFO).dir("live")).unwrap();
    let script = distro.boot_script(&Urls("http://h/d")).unwrap().unwrap();
    assert!(script.as_str().contains("kernel live/vmlinuz initrd=initrd.img"));
    assert!(script.as_str().contains("initrd -n initrd.img live/initrd.img\n"));
}

#[test]
fn test_ubuntu_netboot_script() {
    let distro = detect(
        MemoryTree::new()
            .file("README.diskdefines", UBUNTU_DEFINES)
            .dir("install/netboot"),
    )
    .unwrap();

    assert_eq!(distro.name(), "Ubuntu-Server");
    assert_eq!(distro.version(), "18.04.1 LTS \"Bionic Beaver\" - Release amd64");
    let script = distro.boot_script(&Urls("http://h/u")).unwrap().unwrap();
    assert_eq!(
        script.as_str(),
        "#!ipxe\n\
         kernel install/netboot/ubuntu-installer/amd64/linux initrd=initrd.gz\n\
         initrd install/netboot/ubuntu-installer/amd64/initrd.gz\n\
         boot\n"
    );
}

#[test]
fn test_ubuntu_live_script() {
    let image = IsoBuilder::new()
        .joliet()
        .file("README.diskdefines", "#define DISKNAME  Ubuntu 18.04 LTS\n")
        .file("casper/vmlinuz.efi", "k")
        .write_temp()
        .unwrap();
    let distro = detect(ArchiveTree::open(image.path()).unwrap()).unwrap();

    assert_eq!(distro.kind().id(), "ubuntu-live");
    assert_eq!(distro.name(), "Ubuntu");
    assert_eq!(distro.version(), "18.04 LTS");
    let script = distro.boot_script(&Urls("http://h/u")).unwrap().unwrap();
    assert_eq!(
        script.as_str(),
        "#!ipxe\n\
         kernel casper/vmlinuz.efi initrd=initrd.lz boot=casper live-media=/lib/casper live-media-path=/\n\
         initrd casper/initrd.lz\n\
         initrd casper/filesystem.squashfs /lib/casper/filesystem.squashfs\n\
         boot\n"
    );
}

#[test]
fn test_plain_kinds_have_no_script() {
    let debian = detect(MemoryTree::new().file(".disk/info", DEBIAN_INFO)).unwrap();
    assert!(debian.boot_script(&Urls("http://h")).unwrap().is_none());

    let ubuntu = detect(MemoryTree::new().file("README.diskdefines", "")).unwrap();
    assert!(ubuntu.boot_script(&Urls("http://h")).unwrap().is_none());
    assert_eq!(ubuntu.name(), "");
    assert_eq!(ubuntu.version(), "");
}
