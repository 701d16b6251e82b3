//! free — free-list страниц: FIFO номеров, закодированный цепочкой страниц.
//!
//! Формат LNode (одна страница, LE):
//! |  8B  |   n*8B   |  ...   |
//! | next | pointers | unused |
//!
//! Логическое состояние — (head_page, head_seq, tail_page, tail_seq,
//! max_seq). Секвенции монотонны, слот в странице — seq % FREE_LIST_CAP.
//! max_seq — горизонт потребления: pop не пересекает его, поэтому страница,
//! освобождённая в транзакции, не может быть переиспользована до того, как
//! коммит этой транзакции станет долговечным. set_max_seq() — шаг коммита.
//!
//! Инварианты: head_page != 0; head_seq <= max_seq <= tail_seq.
//!
//! Сам список состояния не хранит страницы: весь ввод/вывод идёт через
//! FreePages (реализуется страничным I/O pager'а и тестовой заглушкой).

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{FREE_LIST_CAP, FREE_LIST_HEADER, PAGE_SIZE};

// ----------------- кодек LNode -----------------

pub fn lnode_next(page: &[u8]) -> u64 {
    LittleEndian::read_u64(&page[0..8])
}

pub fn lnode_set_next(page: &mut [u8], next: u64) {
    LittleEndian::write_u64(&mut page[0..8], next);
}

pub fn lnode_ptr(page: &[u8], idx: usize) -> u64 {
    assert!(idx < FREE_LIST_CAP, "lnode slot {} out of range", idx);
    let pos = FREE_LIST_HEADER + 8 * idx;
    LittleEndian::read_u64(&page[pos..pos + 8])
}

pub fn lnode_set_ptr(page: &mut [u8], idx: usize, ptr: u64) {
    assert!(idx < FREE_LIST_CAP, "lnode slot {} out of range", idx);
    let pos = FREE_LIST_HEADER + 8 * idx;
    LittleEndian::write_u64(&mut page[pos..pos + 8], ptr);
}

// ----------------- очередь -----------------

/// Страничный ввод/вывод, каким его видит free-list: чтение, append новой
/// страницы и отложенная правка существующей на месте.
pub(crate) trait FreePages {
    fn page_bytes(&self, ptr: u64) -> &[u8];
    fn page_append(&mut self, page: Vec<u8>) -> u64;
    fn page_write(&mut self, ptr: u64) -> &mut [u8];
}

pub struct FreeList {
    pub head_page: u64,
    pub head_seq: u64,
    pub tail_page: u64,
    pub tail_seq: u64,
    /// Последняя секвенция, доступная для потребления.
    pub max_seq: u64,
}

#[inline]
fn seq_to_idx(seq: u64) -> usize {
    (seq % FREE_LIST_CAP as u64) as usize
}

impl FreeList {
    /// Достать номер страницы с головы; 0 — взять нечего.
    /// Осушённая головная LNode тут же возвращается в хвост.
    pub(crate) fn pop_head(&mut self, io: &mut impl FreePages) -> u64 {
        let (ptr, head) = self.pop(io);
        if head != 0 {
            self.push_tail(io, head);
        }
        ptr
    }

    /// Поставить номер страницы в хвост.
    pub(crate) fn push_tail(&mut self, io: &mut impl FreePages, ptr: u64) {
        lnode_set_ptr(io.page_write(self.tail_page), seq_to_idx(self.tail_seq), ptr);
        self.tail_seq += 1;
        if seq_to_idx(self.tail_seq) == 0 {
            // Хвостовая страница заполнилась: нужна новая. Сначала пробуем
            // переиспользовать из головы, иначе append.
            let (mut next, head) = self.pop(io);
            if next == 0 {
                next = io.page_append(vec![0u8; PAGE_SIZE]);
            }
            lnode_set_next(io.page_write(self.tail_page), next);
            self.tail_page = next;
            // Осушённая при pop голова встаёт первым слотом нового хвоста.
            if head != 0 {
                lnode_set_ptr(io.page_write(self.tail_page), 0, head);
                self.tail_seq += 1;
            }
        }
    }

    /// Сделать всё поставленное этой транзакцией доступным следующей.
    pub fn set_max_seq(&mut self) {
        self.max_seq = self.tail_seq;
    }

    /// (ptr, осушённая головная страница | 0). Не пересекает max_seq.
    fn pop(&mut self, io: &mut impl FreePages) -> (u64, u64) {
        if self.head_seq >= self.max_seq {
            return (0, 0);
        }
        let ptr = lnode_ptr(io.page_bytes(self.head_page), seq_to_idx(self.head_seq));
        self.head_seq += 1;
        let mut drained = 0;
        if seq_to_idx(self.head_seq) == 0 {
            // Головная страница осушена: отдаём её на переиспользование и
            // двигаем голову дальше по цепочке.
            let next = lnode_next(io.page_bytes(self.head_page));
            assert!(next != 0, "free list head has no successor");
            drained = self.head_page;
            self.head_page = next;
        }
        (ptr, drained)
    }
}
