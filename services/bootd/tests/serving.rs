use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{
        header::{
            CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, ETAG, EXPIRES, HOST, IF_MODIFIED_SINCE,
            IF_NONE_MATCH, LAST_MODIFIED, LOCATION,
        },
        Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use futures_util::StreamExt;
use osboot_bootd::{
    api,
    catalog::BootCatalog,
    config::Config,
    discovery::{discover, Mount},
    state::AppState,
};
use osboot_distro::DetectionCascade;
use osboot_testing::{IsoBuilder, TreeDir};
use osboot_tree::{ArchiveTree, Tree};
use tower::ServiceExt;

const TREEINFO: &str = "[general]\nfamily = ExampleOS\nversion = 9\n";
const DEBIAN_INFO: &str = "Debian GNU/Linux 9.4.0 \"Stretch\" - Official amd64 LIVE Binary";

fn kernel() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 251) as u8).collect()
}

struct Fixture {
    _root: TreeDir,
    app: Router,
    prefixes: Vec<String>,
}

fn fixture() -> Fixture {
    let root = TreeDir::new().unwrap();
    root.iso(
        "isos/example-9.iso",
        &IsoBuilder::new()
            .rock_ridge()
            .file(".treeinfo", TREEINFO)
            .file("images/pxeboot/vmlinuz", kernel())
            .file("images/pxeboot/initrd.img", "initrd")
            .file("EFI/BOOT/BOOTX64.EFI", "efi"),
    )
    .unwrap()
    .file("isos/broken.iso", vec![0u8; 8192])
    .unwrap()
    .file("debian/.disk/info", DEBIAN_INFO)
    .unwrap()
    .file("debian/live/vmlinuz-4.9.0-6-amd64", "kernel")
    .unwrap()
    .file("debian/live/initrd.img-4.9.0-6-amd64", "initrd")
    .unwrap()
    .file("debian/live/filesystem.squashfs", "squashfs")
    .unwrap()
    .file("misc/readme.txt", "hello")
    .unwrap();

    let mounts = discover(root.path(), &DetectionCascade::standard());
    let mut prefixes: Vec<String> = mounts.iter().map(|m| m.prefix().to_string()).collect();
    prefixes.sort();

    let state = AppState::new(
        Config::with_root(root.path()),
        Arc::new(BootCatalog::new(mounts)),
    );
    Fixture {
        _root: root,
        app: api::create_router(state),
        prefixes,
    }
}

async fn get(app: &Router, uri: &str, headers: &[(&str, &str)]) -> Response {
    let mut request = Request::builder().uri(uri).header(HOST, "boot.test");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

fn header<'a>(response: &'a Response, name: axum::http::HeaderName) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn test_discovery_mounts_images_and_directories() {
    let fixture = fixture();
    assert_eq!(fixture.prefixes, vec!["debian", "isos/example-9"]);

    let response = get(&fixture.app, "/healthz", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
    assert_eq!(health["mounts"], 2);
}

#[tokio::test]
async fn test_boot_script_for_image() {
    let fixture = fixture();

    for uri in ["/isos/example-9/", "/isos/example-9/boot.ipxe"] {
        let response = get(&fixture.app, uri, &[]).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, CONTENT_TYPE).starts_with("text/plain"));
        assert_eq!(
            String::from_utf8(body(response).await).unwrap(),
            "#!ipxe\n\
             kernel images/pxeboot/vmlinuz initrd=initrd.img repo=http://boot.test/isos/example-9/\n\
             initrd images/pxeboot/initrd.img\n\
             boot\n"
        );
    }
}

#[tokio::test]
async fn test_mount_without_slash_redirects() {
    let fixture = fixture();
    let response = get(&fixture.app, "/isos/example-9", &[]).await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(header(&response, LOCATION), "/isos/example-9/");
}

#[tokio::test]
async fn test_file_from_image_with_cache_headers() {
    let fixture = fixture();
    let response = get(&fixture.app, "/isos/example-9/images/pxeboot/vmlinuz", &[]).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CONTENT_LENGTH), "200000");
    assert_eq!(header(&response, CONTENT_TYPE), "text/plain");
    assert_eq!(header(&response, CACHE_CONTROL), "max-age=43200, public");
    assert!(header(&response, ETAG).starts_with('"'));
    assert!(header(&response, LAST_MODIFIED).ends_with(" GMT"));
    assert!(header(&response, EXPIRES).ends_with(" GMT"));
    assert_eq!(body(response).await, kernel());

    let efi = get(&fixture.app, "/isos/example-9/EFI/BOOT/BOOTX64.EFI", &[]).await;
    assert_eq!(header(&efi, CONTENT_TYPE), "application/efi");
    assert_eq!(body(efi).await, b"efi");
}

#[tokio::test]
async fn test_conditional_requests_return_not_modified() {
    let fixture = fixture();
    let uri = "/isos/example-9/images/pxeboot/initrd.img";
    let first = get(&fixture.app, uri, &[]).await;
    let etag = header(&first, ETAG).to_string();
    let last_modified = header(&first, LAST_MODIFIED).to_string();

    let cached = get(&fixture.app, uri, &[(IF_NONE_MATCH.as_str(), etag.as_str())]).await;
    assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&cached, ETAG), etag);
    assert_eq!(header(&cached, CACHE_CONTROL), "max-age=43200, public");
    assert!(body(cached).await.is_empty());

    let cached = get(&fixture.app, uri, &[(IF_MODIFIED_SINCE.as_str(), last_modified.as_str())]).await;
    assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);

    let stale = get(&fixture.app, uri, &[(IF_NONE_MATCH.as_str(), "\"0-0-0\"")]).await;
    assert_eq!(stale.status(), StatusCode::OK);

    let other = get(&fixture.app, "/isos/example-9/images/pxeboot/vmlinuz", &[]).await;
    assert_ne!(header(&other, ETAG), etag);
}

#[tokio::test]
async fn test_missing_and_directory_paths() {
    let fixture = fixture();

    let missing = get(&fixture.app, "/isos/example-9/images/pxeboot/nope", &[]).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&missing, CONTENT_TYPE), "application/problem+json");

    let directory = get(&fixture.app, "/isos/example-9/images/pxeboot", &[]).await;
    assert_eq!(directory.status(), StatusCode::FORBIDDEN);
    let problem: serde_json::Value = serde_json::from_slice(&body(directory).await).unwrap();
    assert_eq!(problem["code"], "is_a_directory");
    assert_eq!(problem["status"], 403);

    let escape = get(&fixture.app, "/isos/example-9/../debian/.disk/info", &[]).await;
    assert_ne!(escape.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_raw_tree_boot_script_and_static_files() {
    let fixture = fixture();

    let script = get(&fixture.app, "/debian/", &[]).await;
    assert_eq!(script.status(), StatusCode::OK);
    let script = String::from_utf8(body(script).await).unwrap();
    assert!(script.contains("kernel live/vmlinuz-4.9.0-6-amd64 initrd=initrd.img boot=live"));
    assert!(script.contains("fetch=http://boot.test/debian/live/filesystem.squashfs"));
    assert!(script.contains("initrd -n initrd.img live/initrd.img-4.9.0-6-amd64\n"));

    let squashfs = get(&fixture.app, "/debian/live/filesystem.squashfs", &[]).await;
    assert_eq!(squashfs.status(), StatusCode::OK);
    assert_eq!(body(squashfs).await, b"squashfs");

    let readme = get(&fixture.app, "/misc/readme.txt", &[]).await;
    assert_eq!(readme.status(), StatusCode::OK);
    assert_eq!(body(readme).await, b"hello");

    let nothing = get(&fixture.app, "/nothing/here", &[]).await;
    assert_eq!(nothing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forwarded_proto_in_boot_urls() {
    let fixture = fixture();
    let response = get(&fixture.app, "/debian/boot.ipxe", &[("x-forwarded-proto", "https")]).await;
    let script = String::from_utf8(body(response).await).unwrap();
    assert!(script.contains("fetch=https://boot.test/debian/live/filesystem.squashfs"));
}

#[tokio::test]
async fn test_unsupported_method() {
    let fixture = fixture();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/isos/example-9/")
        .body(Body::empty())
        .unwrap();
    let response = fixture.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_concurrent_downloads_from_one_image() {
    let fixture = fixture();
    let requests = (0..8).map(|i| {
        let app = fixture.app.clone();
        tokio::spawn(async move {
            let uri = if i % 2 == 0 {
                "/isos/example-9/images/pxeboot/vmlinuz"
            } else {
                "/isos/example-9/images/pxeboot/initrd.img"
            };
            let response = get(&app, uri, &[]).await;
            (i, body(response).await)
        })
    });
    for request in requests.collect::<Vec<_>>() {
        let (i, data) = request.await.unwrap();
        if i % 2 == 0 {
            assert_eq!(data, kernel());
        } else {
            assert_eq!(data, b"initrd");
        }
    }
}

#[tokio::test]
async fn test_aborted_download_releases_range_handle() {
    let root = TreeDir::new().unwrap();
    root.iso(
        "example-9.iso",
        &IsoBuilder::new()
            .rock_ridge()
            .file(".treeinfo", TREEINFO)
            .file("images/pxeboot/vmlinuz", kernel()),
    )
    .unwrap();

    let tree = Arc::new(ArchiveTree::open(root.join("example-9.iso")).unwrap());
    let image = Arc::clone(tree.image());
    let distro = DetectionCascade::standard()
        .detect(Arc::clone(&tree) as Arc<dyn Tree>)
        .unwrap();
    let state = AppState::new(
        Config::with_root(root.path()),
        Arc::new(BootCatalog::new(vec![Mount::new("example-9", distro)])),
    );
    let app = api::create_router(state);
    let idle = Arc::strong_count(&image);

    for _ in 0..5 {
        let response = get(&app, "/example-9/images/pxeboot/vmlinuz", &[]).await;
        assert_eq!(response.status(), StatusCode::OK);

        let mut stream = response.into_body().into_data_stream();
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_empty() && first.len() < kernel().len());
        assert_eq!(Arc::strong_count(&image), idle + 1);

        drop(stream);
        assert_eq!(Arc::strong_count(&image), idle);
    }
}
