//! meta — кодек meta-страницы (страница 0) и её валидация при открытии.
//!
//! Формат страницы 0 (LE):
//! | sig | root | flushed | head_page | head_seq | tail_page | tail_seq |
//! | 16B |  8B  |    8B   |     8B    |    8B    |     8B    |    8B    |
//!
//! Политика:
//! - Meta переписывается последним шагом коммита, после fsync данных:
//!   старый и новый корень оба целиком на диске, выбор атомарен.
//! - flushed — число закоммиченных страниц файла (= позиция следующего
//!   append). Страницы за flushed — незакоммиченный мусор после сбоя.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    DB_SIG, META_OFF_FLUSHED, META_OFF_HEAD_PAGE, META_OFF_HEAD_SEQ, META_OFF_ROOT,
    META_OFF_TAIL_PAGE, META_OFF_TAIL_SEQ, PAGE_SIZE,
};

/// Содержимое meta-страницы; заодно — снимок состояния для отката
/// неудавшегося коммита.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    pub root: u64,
    pub flushed: u64,
    pub head_page: u64,
    pub head_seq: u64,
    pub tail_page: u64,
    pub tail_seq: u64,
}

impl Meta {
    /// Сериализация в полную страницу (хвост — нули).
    pub fn encode(&self) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        page[..DB_SIG.len()].copy_from_slice(DB_SIG);
        LittleEndian::write_u64(&mut page[META_OFF_ROOT..META_OFF_ROOT + 8], self.root);
        LittleEndian::write_u64(&mut page[META_OFF_FLUSHED..META_OFF_FLUSHED + 8], self.flushed);
        LittleEndian::write_u64(
            &mut page[META_OFF_HEAD_PAGE..META_OFF_HEAD_PAGE + 8],
            self.head_page,
        );
        LittleEndian::write_u64(
            &mut page[META_OFF_HEAD_SEQ..META_OFF_HEAD_SEQ + 8],
            self.head_seq,
        );
        LittleEndian::write_u64(
            &mut page[META_OFF_TAIL_PAGE..META_OFF_TAIL_PAGE + 8],
            self.tail_page,
        );
        LittleEndian::write_u64(
            &mut page[META_OFF_TAIL_SEQ..META_OFF_TAIL_SEQ + 8],
            self.tail_seq,
        );
        page
    }

    /// Разбор meta-страницы с проверкой сигнатуры.
    pub fn decode(page: &[u8]) -> Result<Meta> {
        if page.len() < PAGE_SIZE {
            return Err(anyhow!("meta page truncated: {} bytes", page.len()));
        }
        if &page[..DB_SIG.len()] != DB_SIG {
            return Err(anyhow!("bad meta signature"));
        }
        Ok(Meta {
            root: LittleEndian::read_u64(&page[META_OFF_ROOT..META_OFF_ROOT + 8]),
            flushed: LittleEndian::read_u64(&page[META_OFF_FLUSHED..META_OFF_FLUSHED + 8]),
            head_page: LittleEndian::read_u64(&page[META_OFF_HEAD_PAGE..META_OFF_HEAD_PAGE + 8]),
            head_seq: LittleEndian::read_u64(&page[META_OFF_HEAD_SEQ..META_OFF_HEAD_SEQ + 8]),
            tail_page: LittleEndian::read_u64(&page[META_OFF_TAIL_PAGE..META_OFF_TAIL_PAGE + 8]),
            tail_seq: LittleEndian::read_u64(&page[META_OFF_TAIL_SEQ..META_OFF_TAIL_SEQ + 8]),
        })
    }

    /// Санити-проверка против фактического размера файла.
    ///
    /// Закоммиченная meta всегда ссылается на непустое дерево (meta пишется
    /// только после успешной вставки/удаления, а sentinel не даёт корню
    /// опустеть), поэтому root == 0 на диске — это порча.
    pub fn validate(&self, file_pages: u64) -> Result<()> {
        if !(self.flushed >= 2 && self.flushed <= file_pages) {
            return Err(anyhow!(
                "bad meta: flushed {} out of range (file has {} pages)",
                self.flushed,
                file_pages
            ));
        }
        if !(self.root > 0 && self.root < self.flushed) {
            return Err(anyhow!(
                "bad meta: root {} out of range (flushed {})",
                self.root,
                self.flushed
            ));
        }
        if self.head_page == 0 || self.head_page >= self.flushed {
            return Err(anyhow!("bad meta: free list head page {}", self.head_page));
        }
        if self.tail_page == 0 || self.tail_page >= self.flushed {
            return Err(anyhow!("bad meta: free list tail page {}", self.tail_page));
        }
        if self.head_seq > self.tail_seq {
            return Err(anyhow!(
                "bad meta: free list head seq {} > tail seq {}",
                self.head_seq,
                self.tail_seq
            ));
        }
        Ok(())
    }
}
