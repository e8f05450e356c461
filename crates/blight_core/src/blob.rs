//! Storage for dataset image bytes, addressed by `blob:` URLs.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCHEME: &str = "blob:";

pub trait BlobStore: Send {
    /// Store `bytes` and return the URL that now refers to them.
    fn put(&self, bytes: &[u8], filename: &str) -> io::Result<String>;
    fn get(&self, url: &str) -> io::Result<Vec<u8>>;
    /// Free the bytes behind `url`.
    fn release(&self, url: &str) -> io::Result<()>;
}

impl<T: BlobStore + Sync + ?Sized> BlobStore for Arc<T> {
    fn put(&self, bytes: &[u8], filename: &str) -> io::Result<String> {
        (**self).put(bytes, filename)
    }

    fn get(&self, url: &str) -> io::Result<Vec<u8>> {
        (**self).get(url)
    }

    fn release(&self, url: &str) -> io::Result<()> {
        (**self).release(url)
    }
}

/// Fresh blob name. The extension comes from the sniffed image format, else
/// from `filename` if it is plain ASCII alphanumerics, else `bin`.
fn new_name(bytes: &[u8], filename: &str) -> String {
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().map(|e| e.to_string()))
        .or_else(|| {
            Path::new(filename)
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty() && e.len() <= 8)
                .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
                .map(|e| e.to_ascii_lowercase())
        })
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{ext}", uuid::Uuid::new_v4().simple())
}

fn name_of(url: &str) -> io::Result<&str> {
    let name = url
        .strip_prefix(SCHEME)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("not a blob url: {url}")))?;
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("bad blob name: {name}"),
        ));
    }
    Ok(name)
}

/// Blobs as files in one directory.
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, url: &str) -> io::Result<PathBuf> {
        Ok(self.root.join(name_of(url)?))
    }
}

impl BlobStore for DirBlobStore {
    fn put(&self, bytes: &[u8], filename: &str) -> io::Result<String> {
        fs::create_dir_all(&self.root)?;
        let name = new_name(bytes, filename);
        fs::write(self.root.join(&name), bytes)?;
        Ok(format!("{SCHEME}{name}"))
    }

    fn get(&self, url: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_of(url)?)
    }

    fn release(&self, url: &str) -> io::Result<()> {
        fs::remove_file(self.path_of(url)?)
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bytes: &[u8], filename: &str) -> io::Result<String> {
        let name = new_name(bytes, filename);
        let url = format!("{SCHEME}{name}");
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, bytes.to_vec());
        Ok(url)
    }

    fn get(&self, url: &str) -> io::Result<Vec<u8>> {
        let name = name_of(url)?;
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, url.to_string()))
    }

    fn release(&self, url: &str) -> io::Result<()> {
        let name = name_of(url)?;
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, url.to_string()))
    }
}
