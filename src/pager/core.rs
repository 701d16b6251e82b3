//! pager/core — структура Pager, восстановление по meta, снапшот и откат.

use anyhow::{anyhow, Result};
use std::fs::File;

use crate::config::StoreConfig;
use crate::consts::PAGE_SIZE;
use crate::free::FreeList;
use crate::meta::Meta;

use super::io::PageIo;

/// Страничный менеджер: ввод/вывод + free-list. Дерево видит его через
/// PageStore (см. pager/alloc.rs).
pub struct Pager {
    pub(crate) io: PageIo,
    pub(crate) free: FreeList,
}

impl Pager {
    /// Восстановить состояние из файла. Возвращает (pager, root).
    ///
    /// Пустой файл — свежая БД: страница 0 зарезервирована под meta,
    /// страница 1 — под первую LNode free-list'а (обе материализуются
    /// первым коммитом; до него на диск ничего не пишется).
    pub(crate) fn open(file: File, file_size: u64, cfg: &StoreConfig) -> Result<(Self, u64)> {
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(anyhow!(
                "store file is corrupt: size {} is not a multiple of page size {}",
                file_size,
                PAGE_SIZE
            ));
        }

        let io = PageIo::new(file, file_size, cfg.map_window, cfg.data_fsync)?;
        let mut pager = Pager {
            io,
            free: FreeList {
                head_page: 1,
                head_seq: 0,
                tail_page: 1,
                tail_seq: 0,
                max_seq: 0,
            },
        };

        if file_size == 0 {
            pager.io.flushed = 2;
            log::debug!("initialized empty store");
            return Ok((pager, 0));
        }

        let page0 = pager.io.read_page_direct(0)?;
        let meta = Meta::decode(&page0)?;
        meta.validate(file_size / PAGE_SIZE as u64)?;

        pager.io.flushed = meta.flushed;
        pager.free.head_page = meta.head_page;
        pager.free.head_seq = meta.head_seq;
        pager.free.tail_page = meta.tail_page;
        pager.free.tail_seq = meta.tail_seq;
        // Всё, что видит закоммиченная meta, доступно для потребления.
        pager.free.max_seq = meta.tail_seq;

        log::debug!(
            "recovered store: root={} flushed={} free=({}, {})..({}, {})",
            meta.root,
            meta.flushed,
            meta.head_page,
            meta.head_seq,
            meta.tail_page,
            meta.tail_seq
        );
        Ok((pager, meta.root))
    }

    /// Снимок состояния до транзакции: и будущая meta-страница, и точка
    /// отката.
    pub(crate) fn snapshot(&self, root: u64) -> Meta {
        Meta {
            root,
            flushed: self.io.flushed,
            head_page: self.free.head_page,
            head_seq: self.free.head_seq,
            tail_page: self.free.tail_page,
            tail_seq: self.free.tail_seq,
        }
    }

    /// Откат к снапшоту. max_seq не трогаем: он продвигается только
    /// успешным коммитом, а неуспешный его и не двигал.
    pub(crate) fn revert(&mut self, snap: &Meta) {
        self.io.rollback(snap.flushed);
        self.free.head_page = snap.head_page;
        self.free.head_seq = snap.head_seq;
        self.free.tail_page = snap.tail_page;
        self.free.tail_seq = snap.tail_seq;
    }
}
