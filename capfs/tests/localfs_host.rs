use capfs::host::localfs::LocalDir;
use capfs::{CapFs, CapFsConfig, Errno, Listing, ReadOptions, ReaddirOptions};
use tempfile::tempdir;

async fn open(dir: &std::path::Path, config: CapFsConfig) -> CapFs<LocalDir> {
    CapFs::connect(LocalDir::open(dir), config).await.unwrap()
}

#[tokio::test]
async fn round_trip_on_disk_in_both_strategies() {
    for prefer_sync in [true, false] {
        let tmp = tempdir().unwrap();
        let fs = open(tmp.path(), CapFsConfig::default().with_sync_access(prefer_sync)).await;
        let expected = if prefer_sync { "exclusive" } else { "copy" };
        assert_eq!(fs.io_strategy(), expected);

        fs.write_file("/src/main.rs", "fn main() {}\n").await.unwrap();
        fs.write_file("/src/main.rs", "fn main() {}").await.unwrap();
        let got = fs.read_file("/src/main.rs", ReadOptions::utf8()).await.unwrap();
        assert_eq!(got.as_text(), Some("fn main() {}"));
        assert_eq!(fs.stat("/src/main.rs").await.unwrap().size, 12);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("src/main.rs")).unwrap(),
            "fn main() {}"
        );
    }
}

#[tokio::test]
async fn directory_operations_on_disk() {
    let tmp = tempdir().unwrap();
    let fs = open(tmp.path(), CapFsConfig::default()).await;

    fs.mkdir("/a/b/c").await.unwrap();
    assert!(tmp.path().join("a/b/c").is_dir());
    let listing = fs
        .readdir("/a/b", ReaddirOptions { with_file_types: true })
        .await
        .unwrap();
    match listing {
        Listing::Entries(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].name, "c");
            assert!(entries[0].is_directory());
        }
        Listing::Names(_) => panic!("expected typed entries"),
    }

    fs.rmdir("/a/b").await.unwrap();
    assert!(!tmp.path().join("a/b").exists());
    assert_eq!(fs.stat("/a/b/c").await.unwrap_err().code(), Errno::Enoent);
}

#[tokio::test]
async fn rename_unlink_and_clear_on_disk() {
    let tmp = tempdir().unwrap();
    let fs = open(tmp.path(), CapFsConfig::default().with_removal_concurrency(2)).await;

    fs.write_file("/one", "1").await.unwrap();
    fs.rename("/one", "/nested/two").await.unwrap();
    assert!(!tmp.path().join("one").exists());
    assert!(tmp.path().join("nested/two").is_file());

    assert_eq!(fs.unlink("/one").await.unwrap_err().code(), Errno::Enoent);
    fs.unlink("/nested/two").await.unwrap();

    for i in 0..6 {
        fs.write_file(&format!("/d{i}/f"), "x").await.unwrap();
    }
    fs.rmdir("/").await.unwrap();
    assert!(fs.readdir("/", ReaddirOptions::default()).await.unwrap().is_empty());
    assert!(tmp.path().is_dir());
}

#[tokio::test]
async fn links_unsupported_on_disk() {
    let tmp = tempdir().unwrap();
    let fs = open(tmp.path(), CapFsConfig::default()).await;
    assert_eq!(fs.symlink("/a", "/b").await.unwrap_err().code(), Errno::Enotsup);
    assert_eq!(fs.readlink("/b").await.unwrap_err().code(), Errno::Enotsup);
}

#[tokio::test]
async fn every_written_name_is_listed_and_cleared() {
    let tmp = tempdir().unwrap();
    let fs = open(tmp.path(), CapFsConfig::default().with_sync_access(false)).await;

    fs.write_file("/notes.crswap", "kept").await.unwrap();
    fs.write_file("/plain", "also kept").await.unwrap();
    assert!(fs.stat("/notes.crswap").await.unwrap().is_file());

    let mut names = fs.readdir("/", ReaddirOptions::default()).await.unwrap().names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(names, vec!["notes.crswap".to_string(), "plain".to_string()]);

    fs.rmdir("/").await.unwrap();
    assert!(fs.readdir("/", ReaddirOptions::default()).await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
}
