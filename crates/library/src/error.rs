use std::path::PathBuf;

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Walk(walkdir::Error),
    NotAFile(PathBuf),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Walk(err) => write!(f, "directory walk error: {}", err),
            LibraryError::NotAFile(path) => write!(f, "not a regular file: {:?}", path),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<walkdir::Error> for LibraryError {
    fn from(err: walkdir::Error) -> Self {
        LibraryError::Walk(err)
    }
}
