use osboot_testing::TreeDir;
use osboot_tree::{RawTree, Tree, TreeError, TreeKind};

fn debian_live() -> TreeDir {
    let dir = TreeDir::new().unwrap();
    dir.file("live/vmlinuz-4.9.0-6-amd64", "kernel")
        .unwrap()
        .file("live/initrd.img-4.9.0-6-amd64", "initrd")
        .unwrap()
        .file("live/filesystem.squashfs", "squash")
        .unwrap()
        .file(".disk/info", "Debian GNU/Linux 9.4.0 \"Stretch\" - Official amd64 LIVE")
        .unwrap()
        .dir("isolinux")
        .unwrap();
    dir
}

#[test]
fn test_lookups() {
    let dir = debian_live();
    let tree = RawTree::new(dir.path());

    assert_eq!(tree.kind(), TreeKind::Raw);
    assert!(!tree.serves_files());
    assert_eq!(tree.root(), dir.path());
    assert!(tree.exists("live/filesystem.squashfs"));
    assert!(tree.exists("/live/"));
    assert!(tree.is_dir("isolinux").unwrap());
    assert_eq!(tree.list("").unwrap(), vec![".disk", "isolinux", "live"]);
    assert_eq!(tree.read("live/vmlinuz-4.9.0-6-amd64").unwrap(), b"kernel");
}

#[test]
fn test_errors() {
    let dir = debian_live();
    let tree = RawTree::new(dir.path());

    assert!(tree.read("live/missing").unwrap_err().is_not_found());
    assert!(tree.read("../outside").unwrap_err().is_not_found());
    assert!(matches!(tree.read("live"), Err(TreeError::IsADirectory(_))));
    assert!(matches!(tree.list(".disk/info"), Err(TreeError::NotADirectory(_))));
    assert!(matches!(
        tree.open_range("live/filesystem.squashfs"),
        Err(TreeError::Unsupported(_))
    ));
}

#[test]
fn test_glob() {
    let dir = debian_live();
    let tree = RawTree::new(dir.path());

    assert_eq!(
        tree.glob("live/vmlinuz-*").unwrap(),
        vec!["live/vmlinuz-4.9.0-6-amd64"]
    );
    assert_eq!(
        tree.glob("live/*.squashfs").unwrap(),
        vec!["live/filesystem.squashfs"]
    );
    assert!(tree.glob("missing/*").unwrap().is_empty());
    assert_eq!(tree.glob("*/info").unwrap(), Vec::<String>::new());
    assert_eq!(tree.glob(".disk/info").unwrap(), vec![".disk/info"]);
}

#[cfg(unix)]
#[test]
fn test_symlinks() {
    let dir = debian_live();
    std::os::unix::fs::symlink("vmlinuz-4.9.0-6-amd64", dir.join("live/vmlinuz")).unwrap();
    let tree = RawTree::new(dir.path());

    assert!(tree.is_symlink("live/vmlinuz").unwrap());
    assert!(!tree.is_symlink("live/filesystem.squashfs").unwrap());
    assert_eq!(tree.read("live/vmlinuz").unwrap(), b"kernel");
}
