//! Bounded retry for transient remote failures

use std::path::Path;

use tracing::warn;

use super::{Metadata, RemoteStore};
use crate::error::BackupResult;

/// Wraps a store and retries calls that fail with a transient error kind
///
/// Conflicts and permanent failures are returned immediately.
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    retries: u32,
}

impl<S: RemoteStore> RetryingStore<S> {
    pub fn new(inner: S, retries: u32) -> Self {
        Self { inner, retries }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, op: &str, mut call: impl FnMut() -> BackupResult<T>) -> BackupResult<T> {
        let mut attempt = 0;
        loop {
            match call() {
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(op, attempt, max = self.retries, error = %e, "Retrying remote call");
                }
                other => return other,
            }
        }
    }
}

impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    fn get_metadata(&self, repo: &str) -> BackupResult<Metadata> {
        self.run("get_metadata", || self.inner.get_metadata(repo))
    }

    fn put_metadata(
        &self,
        repo: &str,
        content: &str,
        version_token: Option<&str>,
    ) -> BackupResult<String> {
        self.run("put_metadata", || {
            self.inner.put_metadata(repo, content, version_token)
        })
    }

    fn upload_blob(&self, repo: &str, local_path: &Path) -> BackupResult<String> {
        self.run("upload_blob", || self.inner.upload_blob(repo, local_path))
    }

    fn download_blob(&self, repo: &str, name: &str, dest_path: &Path) -> BackupResult<()> {
        self.run("download_blob", || {
            self.inner.download_blob(repo, name, dest_path)
        })
    }

    fn delete_blob(&self, repo: &str, name: &str) -> BackupResult<()> {
        self.run("delete_blob", || self.inner.delete_blob(repo, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use crate::remote::RemoteErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails `failures` times with `kind`, then succeeds
    struct Flaky {
        failures: u32,
        kind: RemoteErrorKind,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, kind: RemoteErrorKind) -> Self {
            Self {
                failures,
                kind,
                calls: AtomicU32::new(0),
            }
        }

        fn tick(&self) -> BackupResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(BackupError::remote(self.kind, "boom"))
            } else {
                Ok(())
            }
        }
    }

    impl RemoteStore for Flaky {
        fn get_metadata(&self, _repo: &str) -> BackupResult<Metadata> {
            self.tick().map(|_| Metadata::default())
        }

        fn put_metadata(&self, _: &str, _: &str, _: Option<&str>) -> BackupResult<String> {
            self.tick().map(|_| "commit".to_string())
        }

        fn upload_blob(&self, _: &str, _: &Path) -> BackupResult<String> {
            self.tick().map(|_| "commit".to_string())
        }

        fn download_blob(&self, _: &str, _: &str, _: &Path) -> BackupResult<()> {
            self.tick()
        }

        fn delete_blob(&self, _: &str, _: &str) -> BackupResult<()> {
            self.tick()
        }
    }

    #[test]
    fn test_transient_failures_retried() {
        let store = RetryingStore::new(Flaky::new(2, RemoteErrorKind::Server), 3);
        assert!(store.get_metadata("a/b").is_ok());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_retries() {
        let store = RetryingStore::new(Flaky::new(10, RemoteErrorKind::Network), 3);
        let err = store.delete_blob("a/b", "x").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_permanent_failure_not_retried() {
        let store = RetryingStore::new(Flaky::new(1, RemoteErrorKind::Auth), 3);
        assert!(store.upload_blob("a/b", Path::new("x")).is_err());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_retries() {
        let store = RetryingStore::new(Flaky::new(1, RemoteErrorKind::RateLimited), 0);
        assert!(store.put_metadata("a/b", "{}", None).is_err());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }
}
