//! A [`FileSystem`] over a directory of the local disk.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

use super::{FileSystem, OpenFile};

/// Serves paths relative to a root directory with `std::fs`.
///
/// Paths that would leave the root (`..` components) are rejected with
/// `InvalidInput`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

/// An open file of a [`LocalFs`].
#[derive(Debug)]
pub struct LocalFile {
    name: String,
    file: File,
}

impl OpenFile for LocalFile {
    fn base_name(&self) -> &str {
        &self.name
    }
}

impl LocalFs {
    /// Serve the directory at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory all paths are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir | Component::RootDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("path escapes share root: {path}"),
                    ));
                }
            }
        }
        Ok(resolved)
    }
}

/// Translate `open(2)` flags into `OpenOptions`.
fn open_options(flags: i32, mode: u32) -> OpenOptions {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => options.write(true),
        libc::O_RDWR => options.read(true).write(true),
        _ => options.read(true),
    };
    if flags & libc::O_APPEND != 0 {
        options.append(true);
    }
    if flags & libc::O_TRUNC != 0 {
        options.truncate(true);
    }
    if flags & libc::O_CREAT != 0 {
        if flags & libc::O_EXCL != 0 {
            options.create_new(true);
        } else {
            options.create(true);
        }
    }
    let handled = libc::O_ACCMODE | libc::O_APPEND | libc::O_TRUNC | libc::O_CREAT | libc::O_EXCL;
    options.custom_flags(flags & !handled).mode(mode);
    options
}

impl FileSystem for LocalFs {
    /// Entry names, sorted
    type Dir = Vec<String>;
    type File = LocalFile;

    fn connect(&mut self, service: &str, user: &str) -> io::Result<()> {
        let metadata = fs::metadata(&self.root)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("share root is not a directory: {}", self.root.display()),
            ));
        }
        tracing::debug!(service, user, root = %self.root.display(), "share connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        tracing::debug!(root = %self.root.display(), "share disconnected");
    }

    fn opendir(&mut self, path: &str) -> io::Result<Vec<String>> {
        let mut names = fs::read_dir(self.resolve(path)?)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> io::Result<()> {
        DirBuilder::new().mode(mode).create(self.resolve(path)?)
    }

    fn rmdir(&mut self, path: &str) -> io::Result<()> {
        fs::remove_dir(self.resolve(path)?)
    }

    fn open(&mut self, path: &str, flags: i32, mode: u32) -> io::Result<LocalFile> {
        let file = open_options(flags, mode).open(self.resolve(path)?)?;
        Ok(LocalFile {
            name: path.to_string(),
            file,
        })
    }

    fn close(&mut self, file: LocalFile) -> io::Result<()> {
        drop(file);
        Ok(())
    }

    fn create(&mut self, path: &str) -> io::Result<LocalFile> {
        let file = File::create(self.resolve(path)?)?;
        Ok(LocalFile {
            name: path.to_string(),
            file,
        })
    }

    fn read(&mut self, file: &mut LocalFile, buf: &mut [u8]) -> io::Result<usize> {
        file.file.read(buf)
    }

    fn write(&mut self, file: &mut LocalFile, data: &[u8]) -> io::Result<usize> {
        file.file.write(data)
    }

    fn pread(&mut self, file: &mut LocalFile, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        file.file.read_at(buf, offset)
    }

    fn pwrite(&mut self, file: &mut LocalFile, data: &[u8], offset: u64) -> io::Result<usize> {
        file.file.write_at(data, offset)
    }

    fn lseek(&mut self, file: &mut LocalFile, pos: SeekFrom) -> io::Result<u64> {
        file.file.seek(pos)
    }

    fn rename(&mut self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn unlink(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }
}
