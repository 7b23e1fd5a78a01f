use std::io;
use std::path::Path;

/// Where upload content comes from.
pub trait FileSource: Send + Sync {
    fn read_all(&self, file: &Path) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

impl FileSource for LocalFiles {
    fn read_all(&self, file: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(file)
    }
}
