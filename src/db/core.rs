//! db/core — структура Db и закрытие.

use std::path::{Path, PathBuf};

use crate::lock::LockGuard;
use crate::pager::Pager;
use crate::tree::BTree;

/// Однофайловое KV-хранилище: B+ дерево + free-list поверх pager'а.
/// Один писатель: открытие держит эксклюзивную блокировку файла.
pub struct Db {
    pub(crate) path: PathBuf,
    pub(crate) pager: Pager,
    pub(crate) tree: BTree,
    pub(crate) _lock: LockGuard,
}

impl Db {
    /// Путь к файлу хранилища.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Число закоммиченных страниц файла (meta и начальная LNode — тоже
    /// страницы). Полезно для диагностики переиспользования.
    pub fn flushed_pages(&self) -> u64 {
        self.pager.io.flushed
    }

    /// Закрыть хранилище: Drop снимает mmap-чанки, отпускает блокировку
    /// и закрывает файл. Все успешные операции уже закоммичены.
    pub fn close(self) {
        log::debug!("close store {}", self.path.display());
    }
}
