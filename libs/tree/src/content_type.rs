//! Content-type guessing from file extensions.

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

const BY_EXTENSION: &[(&str, &str)] = &[
    ("cfg", "text/plain"),
    ("conf", "text/plain"),
    ("css", "text/css"),
    ("efi", "application/efi"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("img", "application/octet-stream"),
    ("ipxe", "text/plain"),
    ("iso", "application/x-iso9660-image"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("lz", "application/x-lzip"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("rpm", "application/x-rpm"),
    ("squashfs", "application/octet-stream"),
    ("svg", "image/svg+xml"),
    ("tar", "application/x-tar"),
    ("txt", "text/plain"),
    ("udeb", "application/vnd.debian.binary-package"),
    ("deb", "application/vnd.debian.binary-package"),
    ("xml", "application/xml"),
    ("xz", "application/x-xz"),
    ("zip", "application/zip"),
];

/// Guess the content type of `path` from its extension.
///
/// Unknown or missing extensions map to `text/plain`.
pub fn guess_content_type(path: &str) -> &'static str {
    let name = path.rsplit('/').next().unwrap_or(path);
    let Some((stem, extension)) = name.rsplit_once('.') else {
        return DEFAULT_CONTENT_TYPE;
    };
    if stem.is_empty() {
        return DEFAULT_CONTENT_TYPE;
    }
    let extension = extension.to_ascii_lowercase();
    BY_EXTENSION
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(guess_content_type("EFI/BOOT/BOOTX64.EFI"), "application/efi");
        assert_eq!(guess_content_type("casper/initrd.lz"), "application/x-lzip");
        assert_eq!(guess_content_type("index.HTML"), "text/html");
    }

    #[test]
    fn test_unknown_defaults_to_text_plain() {
        assert_eq!(guess_content_type("live/vmlinuz"), "text/plain");
        assert_eq!(guess_content_type(".treeinfo"), "text/plain");
        assert_eq!(guess_content_type("images/pxeboot/vmlinuz.x"), "text/plain");
    }
}
