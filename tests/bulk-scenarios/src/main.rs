mod fixture;

use std::sync::Arc;

use sftpdir_bulk::{
    BulkTransferEngine, CanonicalPath, Direction, Namespace, PathResolver, TransferOptions,
};
use sftpdir_session::MemorySession;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let tree = fixture::load("bulk-tree.json")?;
    let remote = Arc::new(MemorySession::new("/home/tim/testServer"));
    let root = format!("/home/tim/testServer/{}", tree.name);
    tree.populate_remote(&remote, &root);

    let mirror = MemorySession::default();
    let src = remote_path(&root)?;
    let dst = PathResolver::new(Namespace::Local, "/")?.resolve("/mirror")?;
    let run = BulkTransferEngine::new(&*remote, &mirror, Direction::Download)
        .run_tree(&src, &dst, &TransferOptions::new())
        .await?;

    tracing::info!(
        files = run.summary.files,
        directories = run.summary.directories,
        bytes = run.summary.bytes,
        "fixture mirrored"
    );
    println!("Run `cargo test -p bulk-scenarios` to execute the bulk transfer scenarios.");
    Ok(())
}

fn remote_path(path: &str) -> sftpdir_protocol::Result<CanonicalPath> {
    PathResolver::new(Namespace::Remote, "/")?.resolve(path)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use sftpdir_bulk::{SftpClient, TransferEvent, TransferOptions};
    use sftpdir_protocol::ErrorKind;
    use sftpdir_session::{LocalFs, MemorySession};
    use sftpdir_transfer::checksum_file;
    use tokio::sync::mpsc;

    use crate::fixture::{self, TreeFixture};

    const REMOTE_CWD: &str = "/home/tim/testServer";

    struct Setup {
        tree: TreeFixture,
        remote: Arc<MemorySession>,
        client: SftpClient,
        remote_root: String,
        local: tempfile::TempDir,
    }

    fn setup() -> Setup {
        setup_with(MemorySession::new(REMOTE_CWD))
    }

    fn setup_with(session: MemorySession) -> Setup {
        let tree = fixture::load("bulk-tree.json").unwrap();
        let remote = Arc::new(session);
        let remote_root = format!("{REMOTE_CWD}/{}", tree.name);
        tree.populate_remote(&remote, &remote_root);
        let client = SftpClient::new(remote.clone());
        Setup {
            tree,
            remote,
            client,
            remote_root,
            local: tempfile::tempdir().unwrap(),
        }
    }

    fn path_str(p: &Path) -> String {
        p.to_string_lossy().into_owned()
    }

    /// Counts (files, directories) directly inside `dir`.
    fn counts(dir: &Path) -> (usize, usize) {
        let mut files = 0;
        let mut dirs = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let ft = entry.unwrap().file_type().unwrap();
            if ft.is_file() {
                files += 1;
            } else if ft.is_dir() {
                dirs += 1;
            }
        }
        (files, dirs)
    }

    /// Same as the `/.*file-1.\.txt/` pattern: `file-1`, one character,
    /// then `.txt`.
    fn matches_file_1x(path: &str) -> bool {
        path.match_indices("file-1").any(|(idx, m)| {
            let mut rest = path[idx + m.len()..].chars();
            rest.next().is_some() && rest.as_str().starts_with(".txt")
        })
    }

    fn file_1x_filter() -> TransferOptions {
        TransferOptions::new().with_filter(|path, is_dir| is_dir || matches_file_1x(path))
    }

    fn assert_full_counts(dst: &Path) {
        assert_eq!(counts(dst), (100, 4));
        assert_eq!(counts(&dst.join("subdir-1")), (100, 3));
        assert_eq!(counts(&dst.join("subdir-2/subsubdir-2")), (100, 0));
    }

    fn assert_filtered_counts(dst: &Path) {
        assert_eq!(counts(dst), (10, 4));
        assert_eq!(counts(&dst.join("subdir-1")), (0, 3));
        assert_eq!(counts(&dst.join("subdir-2/subsubdir-2")), (0, 0));
    }

    #[test]
    fn filter_pattern() {
        assert!(matches_file_1x("/x/file-10.txt"));
        assert!(matches_file_1x("/x/file-19.txt"));
        assert!(!matches_file_1x("/x/file-1.txt"));
        assert!(!matches_file_1x("/x/file-100.txt"));
        assert!(!matches_file_1x("/x/file-21.txt"));
    }

    #[test]
    fn fixture_shape() {
        let tree = fixture::load("bulk-tree.json").unwrap();
        assert_eq!(tree.dir_count(), 9);
        assert_eq!(tree.file_count(), 311);
        assert_eq!(tree.files().len(), tree.file_count());
    }

    #[tokio::test]
    async fn download_directory() {
        let s = setup();
        let dst = s.local.path().join("download-test2");
        let resp = s
            .client
            .download_dir(&s.remote_root, &path_str(&dst), TransferOptions::new())
            .await
            .unwrap();
        assert_eq!(resp, format!("{} downloaded to {}", s.remote_root, dst.display()));
        assert_full_counts(&dst);
    }

    #[tokio::test]
    async fn download_directory_with_filter() {
        let s = setup();
        let dst = s.local.path().join("download-test2");
        let resp = s
            .client
            .download_dir(&s.remote_root, &path_str(&dst), file_1x_filter())
            .await
            .unwrap();
        assert_eq!(resp, format!("{} downloaded to {}", s.remote_root, dst.display()));
        assert_filtered_counts(&dst);
    }

    #[tokio::test]
    async fn download_directory_accelerated() {
        let s = setup();
        let dst = s.local.path().join("download-test2");
        s.client
            .download_dir(
                &s.remote_root,
                &path_str(&dst),
                TransferOptions::new().with_accelerated_transfer(true),
            )
            .await
            .unwrap();
        assert_full_counts(&dst);

        let filtered = s.local.path().join("download-test3");
        s.client
            .download_dir(
                &s.remote_root,
                &path_str(&filtered),
                file_1x_filter().with_accelerated_transfer(true),
            )
            .await
            .unwrap();
        assert_filtered_counts(&filtered);
    }

    #[tokio::test]
    async fn relative_remote_source() {
        let s = setup();
        let dst = s.local.path().join("rel");
        let resp = s
            .client
            .download_dir("./bulk-data", &path_str(&dst), TransferOptions::new())
            .await
            .unwrap();
        assert!(resp.starts_with(&s.remote_root));
        assert_full_counts(&dst);
    }

    #[tokio::test]
    async fn bad_source_directory() {
        let s = setup();
        let dst = s.local.path().join("download-test2");
        let err = s
            .client
            .download_dir(
                &format!("{REMOTE_CWD}/no-such-dir"),
                &path_str(&dst),
                TransferOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No such file"), "{err}");
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn bad_destination_is_a_file() {
        let s = setup();
        let file = s.local.path().join("test-file1.txt");
        std::fs::write(&file, b"not a directory").unwrap();
        let err = s
            .client
            .download_dir(&s.remote_root, &path_str(&file), TransferOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Bad path"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bad_destination_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let s = setup();
        let no_perm = s.local.path().join("no-perm-dir");
        std::fs::create_dir(&no_perm).unwrap();
        std::fs::set_permissions(&no_perm, std::fs::Permissions::from_mode(0o111)).unwrap();

        let result = s
            .client
            .download_dir(&s.remote_root, &path_str(&no_perm), TransferOptions::new())
            .await;

        std::fs::set_permissions(&no_perm, std::fs::Permissions::from_mode(0o755)).unwrap();
        let err = result.unwrap_err();
        assert!(err.is(ErrorKind::BadPath));
        assert!(err.to_string().contains("Bad path"), "{err}");
        assert_eq!(std::fs::read_dir(&no_perm).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn various_concurrency_limits() {
        for limit in [1, 10, 20, 40, 80, 160] {
            let s = setup_with(
                MemorySession::new(REMOTE_CWD).with_latency(Duration::from_micros(200)),
            );
            let dst = s.local.path().join(format!("limit-{limit}"));
            s.client
                .download_dir(
                    &s.remote_root,
                    &path_str(&dst),
                    TransferOptions::new().with_concurrency_limit(limit),
                )
                .await
                .unwrap();
            assert_full_counts(&dst);
            assert!(
                s.remote.peak_in_flight() <= limit,
                "limit {limit}, peak {}",
                s.remote.peak_in_flight()
            );
        }
    }

    #[tokio::test]
    async fn upload_then_download_round_trip() {
        let tree = fixture::load("bulk-tree.json").unwrap();
        let local = tempfile::tempdir().unwrap();
        let src = local.path().join("bulk-uploads");
        tree.populate_local(&src).unwrap();

        let remote = Arc::new(MemorySession::new(REMOTE_CWD));
        let client = SftpClient::new(remote.clone());
        let resp = client
            .upload_dir(&path_str(&src), "bulk-data", TransferOptions::new())
            .await
            .unwrap();
        assert_eq!(
            resp,
            format!("{} uploaded to {REMOTE_CWD}/bulk-data", src.display())
        );

        let back = local.path().join("bulk-downloads");
        let run = client
            .download_dir_run("bulk-data", &path_str(&back), TransferOptions::new())
            .await
            .unwrap();
        assert_eq!(run.summary.files, tree.file_count());
        assert_eq!(run.summary.directories, tree.dir_count());

        let fs = LocalFs::new();
        for (relative, data) in tree.files() {
            let original = checksum_file(&fs, &path_str(&src.join(&relative))).await.unwrap();
            let copied = checksum_file(&fs, &path_str(&back.join(&relative))).await.unwrap();
            assert_eq!(original, copied, "{relative}");
            assert_eq!(
                checksum_file(&*remote, &format!("{REMOTE_CWD}/bulk-data/{relative}"))
                    .await
                    .unwrap(),
                sftpdir_transfer::checksum_bytes(&data)
            );
        }
        assert_full_counts(&back);
    }

    #[tokio::test]
    async fn upload_with_filter() {
        let tree = fixture::load("bulk-tree.json").unwrap();
        let local = tempfile::tempdir().unwrap();
        let src = local.path().join("bulk-uploads");
        tree.populate_local(&src).unwrap();

        let remote = Arc::new(MemorySession::new(REMOTE_CWD));
        let client = SftpClient::new(remote.clone());
        client
            .upload_dir(&path_str(&src), "filtered", file_1x_filter())
            .await
            .unwrap();

        let root = format!("{REMOTE_CWD}/filtered");
        let top_files = remote
            .children(&root)
            .into_iter()
            .filter(|name| name.ends_with(".txt"))
            .count();
        assert_eq!(top_files, 10);
        assert!(remote.children(&format!("{root}/subdir-2/subsubdir-2")).is_empty());
    }

    #[tokio::test]
    async fn upload_missing_source() {
        let remote = Arc::new(MemorySession::new(REMOTE_CWD));
        let client = SftpClient::new(remote.clone());
        let local = tempfile::tempdir().unwrap();
        let err = client
            .upload_dir(
                &path_str(&local.path().join("no-such-dir")),
                "bulk-data",
                TransferOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No such file"), "{err}");
        assert_eq!(remote.kind(&format!("{REMOTE_CWD}/bulk-data")), None);
    }

    #[tokio::test]
    async fn download_reports_events() {
        let s = setup();
        let dst = s.local.path().join("events");
        let (tx, mut rx) = mpsc::channel(1024);
        s.client
            .download_dir(
                &s.remote_root,
                &path_str(&dst),
                file_1x_filter().with_events(tx),
            )
            .await
            .unwrap();

        let mut downloaded = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransferEvent::Downloaded { destination, .. } = event {
                downloaded.push(destination);
            }
        }
        assert_eq!(downloaded.len(), 10);
        assert!(downloaded.iter().all(|d| d.starts_with(&path_str(&dst))));
    }

    #[tokio::test]
    async fn mkdir_scenarios() {
        let s = setup();
        s.remote.write(&format!("{REMOTE_CWD}/mkdir-file.txt"), b"x".to_vec());
        s.remote.create_dir_all(&format!("{REMOTE_CWD}/bad-perm-dir"));
        s.remote.set_mode(&format!("{REMOTE_CWD}/bad-perm-dir"), 0o111);

        let err = s.client.mkdir("mkdir-file.txt/sub", true).await.unwrap_err();
        assert!(err.to_string().contains("Bad path"));
        let err = s.client.mkdir("no/parent", false).await.unwrap_err();
        assert!(err.to_string().contains("Bad path"));
        for recursive in [false, true] {
            let err = s.client.mkdir("bad-perm-dir/foo", recursive).await.unwrap_err();
            assert!(err.to_string().contains("Permission denied"), "{err}");
        }
        let first = s.client.mkdir("a/b/c", true).await.unwrap();
        assert!(first.ends_with("directory created"));
        s.client.mkdir("a/b/c", true).await.unwrap();
        assert_eq!(s.remote.children(&format!("{REMOTE_CWD}/a/b")), vec!["c"]);
    }
}
