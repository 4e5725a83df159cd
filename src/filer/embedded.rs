//! Embedded metadata store on sled
//!
//! Layout:
//! - tree `directories`: directory path → directory id (u64, big endian)
//! - tree `files`: directory id ++ file name → file id
//!
//! Files are keyed by their directory's id, so renaming a directory only
//! rewrites directory entries.

use crate::common::{is_within, join_path, normalize_path, split_path, Error, Result};
use crate::filer::{DirectoryEntry, DirectoryId, FileEntry, Filer};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const TREE_DIRECTORIES: &str = "directories";
const TREE_FILES: &str = "files";
const ROOT: &str = "/";

pub struct EmbeddedFiler {
    db: sled::Db,
    directories: sled::Tree,
    files: sled::Tree,
    /// Serializes structural changes (mkdir, move, rmdir)
    write_lock: Mutex<()>,
}

impl EmbeddedFiler {
    /// Open or create the store under `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db = sled::open(dir)?;
        let directories = db.open_tree(TREE_DIRECTORIES)?;
        let files = db.open_tree(TREE_FILES)?;

        if directories.get(ROOT)?.is_none() {
            let root_id = db.generate_id()?;
            directories.insert(ROOT, root_id.to_be_bytes().to_vec())?;
        }

        tracing::info!(
            "Embedded filer opened at {} ({} directories, {} files)",
            dir.display(),
            directories.len(),
            files.len()
        );

        Ok(Self {
            db,
            directories,
            files,
            write_lock: Mutex::new(()),
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dir_id(&self, path: &str) -> Result<Option<DirectoryId>> {
        match self.directories.get(path.as_bytes())? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    fn require_dir(&self, path: &str) -> Result<DirectoryId> {
        self.dir_id(path)?
            .ok_or_else(|| Error::NotFound(format!("directory {}", path)))
    }

    /// Create `path` and any missing parents; caller holds the write lock
    fn make_directory(&self, path: &str) -> Result<DirectoryId> {
        let path = normalize_path(path);
        if let Some(id) = self.dir_id(&path)? {
            return Ok(id);
        }
        let mut current = String::from(ROOT);
        let mut id = self.require_dir(ROOT)?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = join_path(&current, segment);
            id = match self.dir_id(&current)? {
                Some(id) => id,
                None => {
                    let id = self.db.generate_id()?;
                    self.directories
                        .insert(current.as_bytes(), id.to_be_bytes().to_vec())?;
                    tracing::debug!("Created directory {} ({})", current, id);
                    id
                }
            };
        }
        Ok(id)
    }

    fn create_file_locked(&self, path: &str, fid: &str) -> Result<()> {
        let (dir, name) = split_path(path);
        if name.is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        let id = self.make_directory(&dir)?;
        self.files.insert(file_key(id, &name), fid.as_bytes())?;
        Ok(())
    }

    fn delete_file_locked(&self, path: &str) -> Result<String> {
        let (dir, name) = split_path(path);
        let id = self
            .dir_id(&dir)?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        match self.files.remove(file_key(id, &name))? {
            Some(fid) => decode_fid(&fid),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    /// Re-key file `from` as `to` in one batch; an existing `to` is not
    /// overwritten
    fn move_file(&self, from: &str, to: &str) -> Result<()> {
        let (src_dir, src_name) = split_path(from);
        let src_id = self
            .dir_id(&src_dir)?
            .ok_or_else(|| Error::NotFound(from.to_string()))?;
        let src_key = file_key(src_id, &src_name);
        let fid = self
            .files
            .get(&src_key)?
            .ok_or_else(|| Error::NotFound(from.to_string()))?;

        let (dst_dir, dst_name) = split_path(to);
        if dst_name.is_empty() {
            return Err(Error::InvalidPath(to.to_string()));
        }
        let dst_id = self.make_directory(&dst_dir)?;
        let dst_key = file_key(dst_id, &dst_name);
        if dst_key == src_key {
            return Ok(());
        }
        if self.files.get(&dst_key)?.is_some() {
            return Err(Error::AlreadyExists(to.to_string()));
        }

        let mut batch = sled::Batch::default();
        batch.remove(src_key);
        batch.insert(dst_key, fid);
        self.files.apply_batch(batch)?;
        tracing::debug!("Moved file {} to {}", from, to);
        Ok(())
    }

    /// Rename directory `from` (and everything beneath it) to `to`
    fn rename_directory(&self, from: &str, to: &str) -> Result<()> {
        if from == ROOT {
            return Err(Error::InvalidPath("cannot move the root directory".into()));
        }
        if is_within(to, from) {
            return Err(Error::InvalidPath(format!("cannot move {} into {}", from, to)));
        }
        if self.dir_id(to)?.is_some() {
            return Err(Error::AlreadyExists(to.to_string()));
        }
        let (parent, _) = split_path(to);
        self.require_dir(&parent)?;

        let mut batch = sled::Batch::default();
        for entry in self.directories.scan_prefix(from.as_bytes()) {
            let (key, id) = entry?;
            let old = decode_path(&key)?;
            if !is_within(&old, from) {
                continue;
            }
            let renamed = format!("{}{}", to, &old[from.len()..]);
            batch.remove(key);
            batch.insert(renamed.as_bytes(), id);
        }
        self.directories.apply_batch(batch)?;
        tracing::debug!("Moved directory {} to {}", from, to);
        Ok(())
    }
}

#[async_trait]
impl Filer for EmbeddedFiler {
    async fn create_file(&self, path: &str, fid: &str) -> Result<()> {
        let _guard = self.lock();
        self.create_file_locked(path, fid)
    }

    async fn find_file(&self, path: &str) -> Result<String> {
        let (dir, name) = split_path(path);
        let id = self
            .dir_id(&dir)?
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        match self.files.get(file_key(id, &name))? {
            Some(fid) => decode_fid(&fid),
            None => Err(Error::NotFound(path.to_string())),
        }
    }

    async fn delete_file(&self, path: &str) -> Result<String> {
        let _guard = self.lock();
        self.delete_file_locked(path)
    }

    async fn find_directory(&self, path: &str) -> Result<DirectoryId> {
        self.require_dir(&normalize_path(path))
    }

    async fn list_directories(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let path = normalize_path(path);
        self.require_dir(&path)?;
        let prefix = if path == ROOT {
            path.clone()
        } else {
            format!("{}/", path)
        };

        let mut entries = Vec::new();
        for entry in self.directories.scan_prefix(prefix.as_bytes()) {
            let (key, id) = entry?;
            let child = decode_path(&key)?;
            let name = &child[prefix.len()..];
            if name.is_empty() || name.contains('/') {
                continue;
            }
            entries.push(DirectoryEntry {
                name: name.to_string(),
                id: decode_id(&id)?,
            });
        }
        Ok(entries)
    }

    async fn list_files(
        &self,
        path: &str,
        last_file_name: &str,
        limit: usize,
    ) -> Result<Vec<FileEntry>> {
        let id = self.require_dir(&normalize_path(path))?;
        let prefix = id.to_be_bytes();

        let mut entries = Vec::new();
        for entry in self.files.scan_prefix(prefix) {
            if entries.len() >= limit {
                break;
            }
            let (key, fid) = entry?;
            let name = decode_path(&key[prefix.len()..])?;
            if !last_file_name.is_empty() && name.as_str() <= last_file_name {
                continue;
            }
            entries.push(FileEntry {
                name,
                fid: decode_fid(&fid)?,
            });
        }
        Ok(entries)
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<()> {
        let path = normalize_path(path);
        if path == ROOT {
            return Err(Error::InvalidPath("cannot delete the root directory".into()));
        }
        let _guard = self.lock();
        self.require_dir(&path)?;

        let mut doomed = Vec::new();
        for entry in self.directories.scan_prefix(path.as_bytes()) {
            let (key, id) = entry?;
            if is_within(&decode_path(&key)?, &path) {
                doomed.push((key, decode_id(&id)?));
            }
        }

        if !recursive {
            let has_subdirs = doomed.len() > 1;
            let has_files = doomed
                .iter()
                .any(|(_, id)| self.files.scan_prefix(id.to_be_bytes()).next().is_some());
            if has_subdirs || has_files {
                return Err(Error::DirectoryNotEmpty(path));
            }
        }

        let mut file_batch = sled::Batch::default();
        let mut dir_batch = sled::Batch::default();
        for (key, id) in doomed {
            for entry in self.files.scan_prefix(id.to_be_bytes()) {
                let (name_key, _) = entry?;
                file_batch.remove(name_key);
            }
            dir_batch.remove(key);
        }
        self.files.apply_batch(file_batch)?;
        self.directories.apply_batch(dir_batch)?;
        tracing::debug!("Deleted directory {}", path);
        Ok(())
    }

    async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        let from = normalize_path(from);
        let to = normalize_path(to);
        let _guard = self.lock();

        let target_is_dir = self.dir_id(&to)?.is_some();

        if self.dir_id(&from)?.is_some() {
            let (_, name) = split_path(&from);
            let destination = if target_is_dir {
                join_path(&to, &name)
            } else {
                to
            };
            return self.rename_directory(&from, &destination);
        }

        let (_, name) = split_path(&from);
        let destination = if target_is_dir {
            join_path(&to, &name)
        } else {
            to
        };
        self.move_file(&from, &destination)
    }
}

fn file_key(dir_id: DirectoryId, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + name.len());
    key.extend_from_slice(&dir_id.to_be_bytes());
    key.extend_from_slice(name.as_bytes());
    key
}

fn decode_id(bytes: &[u8]) -> Result<DirectoryId> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::MetadataCorrupted(format!("bad directory id length {}", bytes.len())))?;
    Ok(DirectoryId::from_be_bytes(raw))
}

fn decode_path(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::MetadataCorrupted("Invalid UTF-8".into()))
}

fn decode_fid(bytes: &[u8]) -> Result<String> {
    decode_path(bytes)
}
