use std::path::{Path, PathBuf};

/// A destination or source path is either a pipe (stdin/stdout, written as `-`) or a local file.
pub enum PathType {
    Pipe,
    FilePath(PathBuf),
}

impl PathType {
    /// Form a PathType from an input path, e.g. a clap argument.
    pub fn from_path<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        if path.as_ref().to_str() == Some("-") {
            PathType::Pipe
        } else {
            PathType::FilePath(path.as_ref().into())
        }
    }
}
