//! End-to-end filesystem behaviour against the in-memory album service.
//!
//! Every test drives the full stack: adapter → store → resource client →
//! HTTP transport → `MemoryService`.
//!
//! Run with: `cargo test --test filesystem_tests`

use albumfs::model::md5_hex;
use albumfs::network::{DEFAULT_MEMORY_URL, HttpTransport, MemoryService, StaticToken, sample_image};
use albumfs::{AlbumStore, Error, FileKind, FilesystemAdapter, MountConfig, OpenMode, ServiceConfig};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn config() -> ServiceConfig {
    ServiceConfig::new()
        .service_url(DEFAULT_MEMORY_URL)
        .max_retries(2)
        .retry_delay(Duration::from_millis(1))
}

fn mount(service: Arc<MemoryService>, destructive: bool) -> FilesystemAdapter {
    let config = config();
    let transport =
        HttpTransport::with_backend(service, &config, Arc::new(StaticToken::new("secret")));
    let store = AlbumStore::connect(Arc::new(transport), &config).unwrap();
    FilesystemAdapter::new(
        Arc::new(store),
        MountConfig::new().allow_destructive(destructive),
    )
}

fn demo() -> (Arc<MemoryService>, FilesystemAdapter) {
    let service = Arc::new(MemoryService::demo());
    let fs = mount(service.clone(), false);
    (service, fs)
}

async fn names(fs: &FilesystemAdapter, path: &str) -> Vec<String> {
    fs.readdir(path)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}

// =============================================================================
// Listing and attributes
// =============================================================================

#[tokio::test]
async fn test_root_lists_albums() {
    let (_, fs) = demo();
    assert_eq!(names(&fs, "/").await, vec![".", "..", "Trip", "Home", "Empty"]);

    let attr = fs.getattr("/").await.unwrap();
    assert_eq!(attr.kind, FileKind::Directory);
    assert_eq!(attr.size, 3);
}

#[tokio::test]
async fn test_album_lists_photos_with_sizes() {
    let (_, fs) = demo();

    let attr = fs.getattr("/Trip").await.unwrap();
    assert_eq!(attr.kind, FileKind::Directory);
    assert_eq!(attr.size, 2);

    assert_eq!(
        names(&fs, "/Trip").await,
        vec![".", "..", "beach.jpg", "sunset.jpg"]
    );
    assert_eq!(fs.getattr("/Trip/beach.jpg").await.unwrap().size, 100);
    assert_eq!(fs.getattr("/Trip/sunset.jpg").await.unwrap().size, 200);
    assert_eq!(
        fs.getattr("/Trip/beach.jpg").await.unwrap().kind,
        FileKind::RegularFile
    );
}

#[tokio::test]
async fn test_untitled_photo_gets_hashed_name() {
    let (_, fs) = demo();
    let listed = names(&fs, "/Home").await;

    // Demo ids are allocated in order: Home is 4, cat.jpg 5, the untitled photo 6.
    let hashed = format!("{}.jpg", md5_hex("urn:memory:photo:6"));
    assert_eq!(listed, vec![".".to_string(), "..".into(), "cat.jpg".into(), hashed.clone()]);
    assert_eq!(fs.getattr(&format!("/Home/{}", hashed)).await.unwrap().size, 80);
}

#[tokio::test]
async fn test_missing_paths() {
    let (_, fs) = demo();
    for path in ["/Nope", "/Trip/nope.jpg", "/Trip/beach.jpg/deeper", "/a/b/c"] {
        let err = fs.getattr(path).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{}: {:?}", path, err);
        assert_eq!(err.errno(), libc::ENOENT);
    }
}

#[tokio::test]
async fn test_readdir_on_photo_is_not_a_directory() {
    let (_, fs) = demo();
    let err = fs.readdir("/Trip/beach.jpg").await.unwrap_err();
    assert_eq!(err.errno(), libc::ENOTDIR);
}

#[tokio::test]
async fn test_pagination_is_transparent() {
    let service = Arc::new(MemoryService::new());
    let big = service.add_album("Big");
    for i in 0..7 {
        service.add_photo(big, &format!("p{}.jpg", i), sample_image(10 + i, i as u8));
    }
    for i in 0..4 {
        service.add_album(&format!("A{}", i));
    }
    service.set_page_size(2);
    let fs = mount(service.clone(), false);

    assert_eq!(names(&fs, "/").await.len(), 2 + 5);
    let photos = names(&fs, "/Big").await;
    assert_eq!(photos.len(), 2 + 7);
    assert_eq!(photos[2], "p0.jpg");
    assert_eq!(photos[8], "p6.jpg");
    assert!(service.requests().iter().any(|r| r.contains("page=")));
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_listings_load_once() {
    let (service, fs) = demo();
    names(&fs, "/Trip").await;
    let after_first = service.request_count();

    names(&fs, "/").await;
    names(&fs, "/Trip").await;
    fs.getattr("/Trip/beach.jpg").await.unwrap();
    assert_eq!(service.request_count(), after_first);
}

#[tokio::test]
async fn test_invalidate_picks_up_remote_changes() {
    let (service, fs) = demo();
    assert_eq!(names(&fs, "/").await.len(), 5);

    service.add_album("Later");
    assert_eq!(names(&fs, "/").await.len(), 5);

    fs.invalidate().await;
    assert!(names(&fs, "/").await.contains(&"Later".to_string()));
}

#[tokio::test]
async fn test_failed_load_is_retried_on_next_access() {
    let service = Arc::new(MemoryService::demo());
    let config = config().max_retries(0);
    let transport = HttpTransport::with_backend(
        service.clone(),
        &config,
        Arc::new(StaticToken::new("secret")),
    );
    let store = AlbumStore::connect(Arc::new(transport), &config).unwrap();
    let fs = FilesystemAdapter::new(Arc::new(store), MountConfig::default());

    service.fail_next(1, 503);
    let err = fs.readdir("/").await.unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
    assert_eq!(err.errno(), libc::EIO);

    assert_eq!(names(&fs, "/").await.len(), 5);
}

// =============================================================================
// Reading
// =============================================================================

#[tokio::test]
async fn test_read_in_chunks() {
    let (_, fs) = demo();
    fs.open("/Trip/sunset.jpg", OpenMode::Read).await.unwrap();

    let mut out = Vec::new();
    let mut offset = 0u64;
    loop {
        let chunk = fs.read("/Trip/sunset.jpg", offset, 64).await.unwrap();
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        out.extend(chunk);
    }
    assert_eq!(out, sample_image(200, 2));
    fs.release("/Trip/sunset.jpg").await.unwrap();
}

#[tokio::test]
async fn test_read_to_end_drops_cached_image() {
    let (service, fs) = demo();
    fs.getattr("/Trip/beach.jpg").await.unwrap();

    let before = service.request_count();
    fs.read("/Trip/beach.jpg", 0, 10).await.unwrap();
    assert_eq!(service.request_count(), before + 1);

    // Still cached: the first read did not reach the end.
    fs.read("/Trip/beach.jpg", 10, 10).await.unwrap();
    assert_eq!(service.request_count(), before + 1);

    // This one does, so the bytes are dropped and the next read refetches.
    let tail = fs.read("/Trip/beach.jpg", 90, 4096).await.unwrap();
    assert_eq!(tail.len(), 10);
    fs.read("/Trip/beach.jpg", 0, 10).await.unwrap();
    assert_eq!(service.request_count(), before + 2);
}

#[tokio::test]
async fn test_read_past_end_is_empty() {
    let (_, fs) = demo();
    assert!(fs.read("/Trip/beach.jpg", 1000, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_modes() {
    let (_, fs) = demo();
    fs.open("/Trip/beach.jpg", OpenMode::Read).await.unwrap();

    let err = fs.open("/Trip", OpenMode::Read).await.unwrap_err();
    assert_eq!(err.errno(), libc::EISDIR);

    let err = fs.open("/Trip/beach.jpg", OpenMode::Write).await.unwrap_err();
    assert!(matches!(err, Error::BufferNotReady(_)));
    assert_eq!(err.errno(), libc::EIO);

    let err = fs
        .open("/Trip/beach.jpg", OpenMode::ReadWrite)
        .await
        .unwrap_err();
    assert_eq!(err.errno(), libc::EACCES);
}

// =============================================================================
// Writing
// =============================================================================

#[tokio::test]
async fn test_create_write_flush_uploads_photo() {
    let (service, fs) = demo();
    let payload = sample_image(300, 9);

    fs.create("/Trip/new.jpg").await.unwrap();
    fs.open("/Trip/new.jpg", OpenMode::Write).await.unwrap();
    for (i, chunk) in payload.chunks(128).enumerate() {
        fs.write("/Trip/new.jpg", (i * 128) as u64, chunk)
            .await
            .unwrap();
    }
    assert_eq!(fs.getattr("/Trip/new.jpg").await.unwrap().size, 300);

    fs.flush("/Trip/new.jpg").await.unwrap();
    fs.release("/Trip/new.jpg").await.unwrap();

    assert_eq!(service.photo_bytes("Trip", "new.jpg"), Some(payload.clone()));
    assert_eq!(
        names(&fs, "/Trip").await,
        vec![".", "..", "beach.jpg", "sunset.jpg", "new.jpg"]
    );
    assert_eq!(fs.getattr("/Trip").await.unwrap().size, 3);
    assert_eq!(fs.read("/Trip/new.jpg", 0, 4096).await.unwrap(), payload);
}

#[tokio::test]
async fn test_uploaded_photo_survives_invalidate() {
    let (_, fs) = demo();
    let payload = sample_image(42, 7);
    fs.create("/Empty/one.jpg").await.unwrap();
    fs.write("/Empty/one.jpg", 0, &payload).await.unwrap();
    fs.flush("/Empty/one.jpg").await.unwrap();

    fs.invalidate().await;
    let photo = fs
        .store()
        .get("Empty")
        .await
        .unwrap()
        .unwrap()
        .photo("one.jpg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*photo.image().await.unwrap(), payload);
}

#[tokio::test]
async fn test_uploaded_name_is_stable_across_reload() {
    let (_, fs) = demo();
    fs.create("/Trip/IMG 0001.jpg").await.unwrap();
    fs.write("/Trip/IMG 0001.jpg", 0, b"abc").await.unwrap();
    fs.flush("/Trip/IMG 0001.jpg").await.unwrap();
    assert_eq!(fs.getattr("/Trip/IMG 0001.jpg").await.unwrap().size, 3);

    fs.invalidate().await;
    assert_eq!(fs.getattr("/Trip/IMG 0001.jpg").await.unwrap().size, 3);
    assert!(names(&fs, "/Trip").await.contains(&"IMG 0001.jpg".to_string()));
}

#[tokio::test]
async fn test_names_a_reload_would_rewrite_are_refused() {
    let (service, fs) = demo();
    for path in ["/Trip/a.jpg ", "/Trip/Untitled"] {
        assert_eq!(fs.create(path).await.unwrap_err().errno(), libc::EPERM, "{:?}", path);
    }
    assert_eq!(fs.mkdir("/Holiday ").await.unwrap_err().errno(), libc::EPERM);
    assert_eq!(fs.mkdir("/..").await.unwrap_err().errno(), libc::EPERM);

    fs.invalidate().await;
    assert_eq!(names(&fs, "/Trip").await, vec![".", "..", "beach.jpg", "sunset.jpg"]);
    assert!(!service.album_titles().contains(&"Holiday ".to_string()));
}

#[tokio::test]
async fn test_flush_is_one_shot() {
    let (_, fs) = demo();
    let err = fs.flush("/Trip/never.jpg").await.unwrap_err();
    assert!(matches!(err, Error::BufferNotReady(_)));

    fs.create("/Trip/once.jpg").await.unwrap();
    fs.write("/Trip/once.jpg", 0, b"x").await.unwrap();
    fs.flush("/Trip/once.jpg").await.unwrap();
    let err = fs.flush("/Trip/once.jpg").await.unwrap_err();
    assert!(matches!(err, Error::BufferNotReady(_)));
}

#[tokio::test]
async fn test_write_without_create() {
    let (_, fs) = demo();
    let err = fs.write("/Trip/beach.jpg", 0, b"x").await.unwrap_err();
    assert!(matches!(err, Error::BufferNotReady(_)));
}

#[tokio::test]
async fn test_create_rules() {
    let (_, fs) = demo();
    assert_eq!(
        fs.create("/Trip/beach.jpg").await.unwrap_err().errno(),
        libc::EEXIST
    );
    assert_eq!(fs.create("/loose.jpg").await.unwrap_err().errno(), libc::EPERM);
    assert_eq!(
        fs.create("/Missing/a.jpg").await.unwrap_err().errno(),
        libc::ENOENT
    );
}

#[tokio::test]
async fn test_release_without_flush_discards() {
    let (service, fs) = demo();
    fs.create("/Trip/drop.jpg").await.unwrap();
    fs.write("/Trip/drop.jpg", 0, b"abc").await.unwrap();
    fs.release("/Trip/drop.jpg").await.unwrap();

    assert!(matches!(
        fs.getattr("/Trip/drop.jpg").await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(service.photo_bytes("Trip", "drop.jpg"), None);
}

#[tokio::test]
async fn test_upload_retries_transient_failures() {
    let (service, fs) = demo();
    fs.create("/Trip/flaky.jpg").await.unwrap();
    fs.write("/Trip/flaky.jpg", 0, b"data").await.unwrap();

    service.fail_next(2, 502);
    fs.flush("/Trip/flaky.jpg").await.unwrap();
    assert_eq!(service.photo_bytes("Trip", "flaky.jpg"), Some(b"data".to_vec()));
}

#[tokio::test]
async fn test_upload_gives_up_after_retries() {
    let (service, fs) = demo();
    fs.create("/Trip/down.jpg").await.unwrap();
    fs.write("/Trip/down.jpg", 0, b"data").await.unwrap();
    names(&fs, "/Trip").await;

    let before = service.request_count();
    service.fail_next(10, 500);
    let err = fs.flush("/Trip/down.jpg").await.unwrap_err();
    assert_eq!(err.errno(), libc::EIO);
    // One attempt plus two retries.
    assert_eq!(service.request_count(), before + 3);
}

// =============================================================================
// Directories and deletion
// =============================================================================

#[tokio::test]
async fn test_mkdir_creates_album_once() {
    let (service, fs) = demo();
    fs.mkdir("/Holiday").await.unwrap();

    let listed = names(&fs, "/").await;
    assert_eq!(listed.iter().filter(|n| *n == "Holiday").count(), 1);
    assert!(service.album_titles().contains(&"Holiday".to_string()));
    assert_eq!(fs.getattr("/Holiday").await.unwrap().size, 0);

    let err = fs.mkdir("/Holiday").await.unwrap_err();
    assert_eq!(err.errno(), libc::EEXIST);
}

#[tokio::test]
async fn test_mkdir_nested_is_refused() {
    let (_, fs) = demo();
    assert_eq!(fs.mkdir("/Trip/sub").await.unwrap_err().errno(), libc::EPERM);
}

#[tokio::test]
async fn test_destructive_ops_disabled() {
    let (service, fs) = demo();
    let before = names(&fs, "/Trip").await;

    let err = fs.unlink("/Trip/beach.jpg").await.unwrap_err();
    assert!(matches!(err, Error::NotPermitted(_)));
    assert_eq!(err.errno(), libc::EPERM);
    assert_eq!(fs.rmdir("/Empty").await.unwrap_err().errno(), libc::EPERM);

    assert_eq!(names(&fs, "/Trip").await, before);
    assert!(service.photo_bytes("Trip", "beach.jpg").is_some());
}

#[tokio::test]
async fn test_unlink_removes_photo() {
    let service = Arc::new(MemoryService::demo());
    let fs = mount(service.clone(), true);

    fs.unlink("/Trip/beach.jpg").await.unwrap();
    assert_eq!(names(&fs, "/Trip").await, vec![".", "..", "sunset.jpg"]);
    assert_eq!(fs.getattr("/Trip").await.unwrap().size, 1);
    assert_eq!(service.photo_titles("Trip"), vec!["sunset.jpg".to_string()]);

    assert_eq!(fs.unlink("/Trip").await.unwrap_err().errno(), libc::EISDIR);
    assert_eq!(
        fs.unlink("/Trip/beach.jpg").await.unwrap_err().errno(),
        libc::ENOENT
    );
}

#[tokio::test]
async fn test_rmdir_rules() {
    let service = Arc::new(MemoryService::demo());
    let fs = mount(service.clone(), true);

    assert_eq!(fs.rmdir("/Trip").await.unwrap_err().errno(), libc::ENOTEMPTY);
    assert_eq!(
        fs.rmdir("/Trip/beach.jpg").await.unwrap_err().errno(),
        libc::ENOTDIR
    );

    fs.rmdir("/Empty").await.unwrap();
    assert_eq!(names(&fs, "/").await, vec![".", "..", "Trip", "Home"]);
    assert!(!service.album_titles().contains(&"Empty".to_string()));
}

#[tokio::test]
async fn test_writable_permissions_follow_mount_config() {
    let (_, read_only) = demo();
    let writable = mount(Arc::new(MemoryService::demo()), true);

    let ro = read_only.getattr("/Trip/beach.jpg").await.unwrap().perm;
    let rw = writable.getattr("/Trip/beach.jpg").await.unwrap().perm;
    assert_eq!(ro & 0o200, 0);
    assert_ne!(rw & 0o200, 0);
}

#[tokio::test]
async fn test_directory_permissions_follow_mount_config() {
    let (_, read_only) = demo();
    let writable = mount(Arc::new(MemoryService::demo()), true);

    for path in ["/", "/Trip"] {
        assert_eq!(read_only.getattr(path).await.unwrap().perm, 0o444, "{path}");
        assert_eq!(writable.getattr(path).await.unwrap().perm, 0o744, "{path}");
    }
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_token_is_sent() {
    let service = Arc::new(MemoryService::demo());
    service.require_token("secret");
    let fs = mount(service, false);
    assert_eq!(names(&fs, "/").await.len(), 5);
}

#[tokio::test]
async fn test_wrong_token_fails_with_eio() {
    let service = Arc::new(MemoryService::demo());
    service.require_token("other");
    let fs = mount(service, false);
    let err = fs.readdir("/").await.unwrap_err();
    assert_eq!(err.errno(), libc::EIO);
}
