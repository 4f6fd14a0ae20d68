use std::fmt::Debug;
use std::io;
use std::path::Path;

/// Abstraction over the filesystem operations the harness needs for loading its inputs.
///
/// This trait is automatically mocked by mockall in test builds, generating `MockFilesystem`.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait Filesystem: Debug + Send + Sync + 'static {
    /// Reads the entire file at `path` as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}
