//! Общие константы формата (страницы, узлы дерева, meta, free-list, mmap).

// -------- Pages --------
pub const PAGE_SIZE: usize = 4096;

// -------- B+ tree nodes --------
// Заголовок узла: [type u16][nkeys u16]
pub const HEADER: usize = 4;

pub const BNODE_NODE: u16 = 1; // internal
pub const BNODE_LEAF: u16 = 2;

pub const MAX_KEY_SIZE: usize = 1000;
pub const MAX_VAL_SIZE: usize = 3000;

// Порог недозаполненности: узел меньше этого размера — кандидат на merge.
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

// -------- Meta (page 0) --------
// Формат (LE):
// [sig 16B][root u64][flushed u64][head_page u64][head_seq u64][tail_page u64][tail_seq u64]
pub const DB_SIG: &[u8; 16] = b"0123456789ABCDEF";

pub const META_OFF_ROOT: usize = 16;
pub const META_OFF_FLUSHED: usize = 24;
pub const META_OFF_HEAD_PAGE: usize = 32;
pub const META_OFF_HEAD_SEQ: usize = 40;
pub const META_OFF_TAIL_PAGE: usize = 48;
pub const META_OFF_TAIL_SEQ: usize = 56;

// -------- Free list --------
// Формат LNode (одна страница):
// |  8B  |   n*8B   |  ...   |
// | next | pointers | unused |
pub const FREE_LIST_HEADER: usize = 8;
pub const FREE_LIST_CAP: usize = (PAGE_SIZE - FREE_LIST_HEADER) / 8; // 511

// -------- Mmap --------
// Начальное окно маппинга; при нехватке удваивается (новыми чанками).
pub const MMAP_MIN_WINDOW: u64 = 64 << 20;
