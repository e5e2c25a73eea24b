//! Files the program loader reads from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// An open file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fd(pub usize);

/// Minimal file access needed by the loader.
pub trait FileSystem {
    /// Open a file by name.
    fn open(&mut self, name: &str) -> Result<Fd>;

    /// Size of an open file in bytes.
    fn size(&self, fd: Fd) -> Result<usize>;

    /// Fill `buf` from the current offset.
    ///
    /// The whole buffer is always written: bytes past end-of-file are
    /// zero-filled. Returns how many bytes came from the file and advances
    /// the offset by that amount.
    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize>;

    /// Close a descriptor.
    fn close(&mut self, fd: Fd) -> Result<()>;
}

/// Copy from `data[offset..]` into `buf`, zero-padding the rest.
fn copy_padded(data: &[u8], offset: usize, buf: &mut [u8]) -> usize {
    let available = data.len().saturating_sub(offset);
    let n = available.min(buf.len());
    buf[..n].copy_from_slice(&data[offset..offset + n]);
    buf[n..].fill(0);
    n
}

/// Descriptor table shared by the file systems below.
#[derive(Debug)]
struct OpenFiles<T> {
    slots: Vec<Option<(T, usize)>>,
}

impl<T> Default for OpenFiles<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> OpenFiles<T> {
    fn insert(&mut self, file: T) -> Fd {
        match self.slots.iter().position(Option::is_none) {
            Some(idx) => {
                self.slots[idx] = Some((file, 0));
                Fd(idx)
            }
            None => {
                self.slots.push(Some((file, 0)));
                Fd(self.slots.len() - 1)
            }
        }
    }

    fn get(&self, fd: Fd) -> Result<&(T, usize)> {
        self.slots
            .get(fd.0)
            .and_then(Option::as_ref)
            .ok_or(Error::BadDescriptor(fd.0))
    }

    fn get_mut(&mut self, fd: Fd) -> Result<&mut (T, usize)> {
        self.slots
            .get_mut(fd.0)
            .and_then(Option::as_mut)
            .ok_or(Error::BadDescriptor(fd.0))
    }

    fn remove(&mut self, fd: Fd) -> Result<()> {
        match self.slots.get_mut(fd.0) {
            Some(slot) if slot.is_some() => {
                *slot = None;
                Ok(())
            }
            _ => Err(Error::BadDescriptor(fd.0)),
        }
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// In-memory file table, the equivalent of a ramdisk image with a table of
/// named files in it.
#[derive(Debug, Default)]
pub struct RamdiskFs {
    files: HashMap<String, Vec<u8>>,
    open: OpenFiles<String>,
}

impl RamdiskFs {
    /// Create an empty file table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file.
    pub fn add_file(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), data.into());
    }

    /// Number of currently open descriptors.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn data(&self, name: &str) -> &[u8] {
        self.files.get(name).map(Vec::as_slice).unwrap_or_default()
    }
}

impl FileSystem for RamdiskFs {
    fn open(&mut self, name: &str) -> Result<Fd> {
        if !self.files.contains_key(name) {
            return Err(Error::FileNotFound(name.to_string()));
        }
        Ok(self.open.insert(name.to_string()))
    }

    fn size(&self, fd: Fd) -> Result<usize> {
        let (name, _) = self.open.get(fd)?;
        Ok(self.data(name).len())
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let (name, offset) = self.open.get(fd)?;
        let n = copy_padded(self.data(name), *offset, buf);
        self.open.get_mut(fd)?.1 += n;
        Ok(n)
    }

    fn close(&mut self, fd: Fd) -> Result<()> {
        self.open.remove(fd)
    }
}

/// Files served from a directory on the host.
///
/// Names are resolved relative to the root, with any leading `/` stripped.
/// A file is read fully into memory when it is opened.
#[derive(Debug)]
pub struct HostFs {
    root: PathBuf,
    open: OpenFiles<Vec<u8>>,
}

impl HostFs {
    /// Serve files below `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            open: OpenFiles::default(),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

impl FileSystem for HostFs {
    fn open(&mut self, name: &str) -> Result<Fd> {
        let data = match std::fs::read(self.resolve(name)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.open.insert(data))
    }

    fn size(&self, fd: Fd) -> Result<usize> {
        Ok(self.open.get(fd)?.0.len())
    }

    fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let (data, offset) = self.open.get_mut(fd)?;
        let n = copy_padded(data, *offset, buf);
        *offset += n;
        Ok(n)
    }

    fn close(&mut self, fd: Fd) -> Result<()> {
        self.open.remove(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramdisk_read_zero_pads() {
        let mut fs = RamdiskFs::new();
        fs.add_file("/bin/a", b"abcdef".to_vec());

        let fd = fs.open("/bin/a").unwrap();
        assert_eq!(fs.size(fd).unwrap(), 6);

        let mut buf = [0xffu8; 4];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");

        assert_eq!(fs.read(fd, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ef\0\0");

        // At end-of-file the buffer is all zeros
        let mut buf = [0xffu8; 4];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);
        assert_eq!(buf, [0; 4]);

        fs.close(fd).unwrap();
        assert_eq!(fs.open_count(), 0);
    }

    #[test]
    fn test_ramdisk_missing_file() {
        let mut fs = RamdiskFs::new();
        assert!(matches!(
            fs.open("/nope"),
            Err(Error::FileNotFound(ref name)) if name == "/nope"
        ));
    }

    #[test]
    fn test_descriptors_are_independent() {
        let mut fs = RamdiskFs::new();
        fs.add_file("f", b"0123".to_vec());
        let a = fs.open("f").unwrap();
        let b = fs.open("f").unwrap();
        assert_ne!(a, b);

        let mut buf = [0u8; 2];
        fs.read(a, &mut buf).unwrap();
        fs.read(b, &mut buf).unwrap();
        assert_eq!(&buf, b"01");

        fs.close(a).unwrap();
        assert!(matches!(fs.close(a), Err(Error::BadDescriptor(_))));
        assert!(matches!(fs.size(a), Err(Error::BadDescriptor(_))));

        // Freed slot is reused
        assert_eq!(fs.open("f").unwrap(), a);
    }

    #[test]
    fn test_host_fs() {
        let root = std::env::temp_dir().join(format!("guestmem-hostfs-{}", std::process::id()));
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin/prog"), [1u8, 2, 3]).unwrap();

        let mut fs = HostFs::new(&root);
        let fd = fs.open("/bin/prog").unwrap();
        assert_eq!(fs.size(fd).unwrap(), 3);

        let mut buf = [0xaau8; 8];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3, 0, 0, 0, 0, 0]);
        fs.close(fd).unwrap();

        assert!(matches!(
            fs.open("/bin/missing"),
            Err(Error::FileNotFound(_))
        ));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
