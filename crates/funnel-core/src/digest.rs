//! SHA-256 of many files, read concurrently up to a limit.

use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{utils::task_error, FunnelError};
use crate::task_queue::limiter;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDigest {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// Hash one file in 64 KiB reads. Failures are task errors tagged with `index`.
pub async fn digest_file(index: usize, path: PathBuf) -> Result<FileDigest, FunnelError> {
    let fail = |e: std::io::Error| task_error("digest", Some(index), &format!("{}: {}", path.display(), e));

    let mut file = File::open(&path).await.map_err(fail)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut bytes = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(fail)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        bytes += n as u64;
    }
    Ok(FileDigest {
        sha256: format!("{:x}", hasher.finalize()),
        path,
        bytes,
    })
}

/// Digest every path, at most `concurrency` open at once, results in argument order.
pub async fn digest_files<S>(concurrency: usize, paths: Vec<PathBuf>, on_settled: S) -> Result<Vec<FileDigest>, FunnelError>
where
    S: Fn() + Send + Sync + 'static,
{
    let on_settled = Arc::new(on_settled);
    limiter(concurrency, paths.into_iter().enumerate(), move |(index, path): (usize, PathBuf)| {
        let on_settled = Arc::clone(&on_settled);
        async move {
            let result = digest_file(index, path).await;
            on_settled();
            result
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_digest_known_value() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();

        let digest = digest_file(0, path.clone()).await.unwrap();
        assert_eq!(
            digest.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.bytes, 3);
        assert_eq!(digest.path, path);
    }

    #[tokio::test]
    async fn test_digest_files_keeps_argument_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (i, size) in [200_000usize, 10, 70_000, 0].iter().enumerate() {
            let path = tmp.path().join(format!("f{}", i));
            std::fs::write(&path, vec![b'x'; *size]).unwrap();
            paths.push(path);
        }

        let digests = digest_files(2, paths.clone(), || {}).await.unwrap();
        let got: Vec<_> = digests.iter().map(|d| d.path.clone()).collect();
        assert_eq!(got, paths);
        assert_eq!(digests[0].bytes, 200_000);
        assert_eq!(digests[3].bytes, 0);
    }

    #[tokio::test]
    async fn test_missing_file_reports_its_index() {
        let tmp = tempfile::tempdir().unwrap();
        let present = tmp.path().join("present");
        std::fs::write(&present, b"data").unwrap();
        let paths = vec![
            present,
            tmp.path().join("missing-1"),
            tmp.path().join("missing-2"),
        ];

        let err = digest_files(3, paths, || {}).await.unwrap_err();
        assert_eq!(err.task_index(), Some(1));
        assert!(err.source_message().contains("missing-1"));
    }
}
