//! db/open — открытие: создание файла с fsync каталога, блокировка,
//! восстановление состояния по meta.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::config::StoreConfig;
use crate::lock;
use crate::pager::Pager;
use crate::tree::BTree;

use super::core::Db;

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Db> {
        Self::open_with_config(path, StoreConfig::from_env())
    }

    pub fn open_with_config(path: impl AsRef<Path>, cfg: StoreConfig) -> Result<Db> {
        let path = path.as_ref();
        cfg.validate()?;

        let file = create_file_sync(path)?;
        let guard = lock::try_acquire_exclusive(&file, path)?;

        let file_size = file
            .metadata()
            .with_context(|| format!("stat store file {}", path.display()))?
            .len();
        let (pager, root) = Pager::open(file, file_size, &cfg)?;

        Ok(Db {
            path: path.to_path_buf(),
            pager,
            tree: BTree::with_root(root),
            _lock: guard,
        })
    }
}

/// Открыть или создать файл хранилища. При создании — fsync родительского
/// каталога, чтобы сам факт появления файла пережил сбой.
fn create_file_sync(path: &Path) -> Result<File> {
    let existed = path.exists();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .with_context(|| format!("open store file {}", path.display()))?;
    if !existed {
        fsync_dir(path)?;
    }
    Ok(file)
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = File::open(parent)
                .with_context(|| format!("open parent directory of {}", path.display()))?;
            dir.sync_all().context("fsync parent directory")?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> Result<()> {
    Ok(())
}
