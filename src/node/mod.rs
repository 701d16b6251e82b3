//! node — кодек узла B+ дерева поверх «сырой» страницы.
//!
//! Формат узла (LE):
//! | type | nkeys |  pointers  |   offsets  | packed KVs |
//! |  2B  |   2B  | nkeys * 8B | nkeys * 2B |     ...    |
//!
//! Каждая KV-запись: [klen u16][vlen u16][key][val].
//! offset[i] — смещение начала записи i относительно начала KV-региона;
//! offset[0] = 0 не хранится, offset[nkeys] задаёт длину региона, поэтому
//! nbytes() считается за O(1).
//!
//! BNode — тонкая обёртка над байтовым буфером без владения форматом:
//! - BNode::view(&[u8]) — заимствованное чтение страницы (mmap);
//! - BNode::page()/scratch() — владеющие буферы 1x/2x страницы для сборки
//!   новых узлов (copy-on-write никогда не правит страницу на месте).
//!
//! Выход за границы слотов — программная ошибка: assert, не Result.

use byteorder::{ByteOrder, LittleEndian};
use std::cmp::Ordering;

use crate::consts::{BNODE_LEAF, BNODE_NODE, HEADER, PAGE_SIZE};

mod split;
pub use split::{node_split2, node_split3};

pub struct BNode<B: AsRef<[u8]> = Vec<u8>> {
    data: B,
}

// ----------------- конструкторы -----------------

impl BNode<Vec<u8>> {
    /// Пустой владеющий узел размером в одну страницу.
    pub fn page() -> Self {
        BNode {
            data: vec![0u8; PAGE_SIZE],
        }
    }

    /// Рабочий буфер 2x страницы: промежуточный результат вставки может
    /// не влезать в страницу до сплита.
    pub fn scratch() -> Self {
        BNode {
            data: vec![0u8; 2 * PAGE_SIZE],
        }
    }

    /// Владеющая копия уже существующей страницы.
    pub fn from_page(page: &[u8]) -> Self {
        assert_eq!(page.len(), PAGE_SIZE, "node page must be {} bytes", PAGE_SIZE);
        BNode {
            data: page.to_vec(),
        }
    }

    /// Готовый узел -> байты страницы (ровно PAGE_SIZE).
    pub fn into_page(self) -> Vec<u8> {
        let used = self.nbytes();
        assert!(used <= PAGE_SIZE, "node overflows page: {} bytes", used);
        let mut data = self.data;
        data.truncate(PAGE_SIZE);
        data
    }
}

impl<'a> BNode<&'a [u8]> {
    /// Заимствованное представление страницы (например, из mmap).
    pub fn view(page: &'a [u8]) -> Self {
        BNode { data: page }
    }
}

// ----------------- доступ на чтение -----------------

impl<B: AsRef<[u8]>> BNode<B> {
    pub fn btype(&self) -> u16 {
        LittleEndian::read_u16(&self.data.as_ref()[0..2])
    }

    pub fn nkeys(&self) -> u16 {
        LittleEndian::read_u16(&self.data.as_ref()[2..4])
    }

    pub fn ptr(&self, idx: u16) -> u64 {
        assert!(idx < self.nkeys(), "ptr slot {} out of range", idx);
        let pos = HEADER + 8 * idx as usize;
        LittleEndian::read_u64(&self.data.as_ref()[pos..pos + 8])
    }

    fn offset_pos(&self, idx: u16) -> usize {
        assert!(
            1 <= idx && idx <= self.nkeys(),
            "offset slot {} out of range",
            idx
        );
        HEADER + 8 * self.nkeys() as usize + 2 * (idx as usize - 1)
    }

    pub fn offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        let pos = self.offset_pos(idx);
        LittleEndian::read_u16(&self.data.as_ref()[pos..pos + 2])
    }

    /// Байтовая позиция записи idx; idx == nkeys() даёт конец узла.
    pub fn kv_pos(&self, idx: u16) -> usize {
        assert!(idx <= self.nkeys(), "kv slot {} out of range", idx);
        HEADER + 10 * self.nkeys() as usize + self.offset(idx) as usize
    }

    pub fn key(&self, idx: u16) -> &[u8] {
        assert!(idx < self.nkeys(), "key slot {} out of range", idx);
        let pos = self.kv_pos(idx);
        let data = self.data.as_ref();
        let klen = LittleEndian::read_u16(&data[pos..pos + 2]) as usize;
        &data[pos + 4..pos + 4 + klen]
    }

    pub fn val(&self, idx: u16) -> &[u8] {
        assert!(idx < self.nkeys(), "val slot {} out of range", idx);
        let pos = self.kv_pos(idx);
        let data = self.data.as_ref();
        let klen = LittleEndian::read_u16(&data[pos..pos + 2]) as usize;
        let vlen = LittleEndian::read_u16(&data[pos + 2..pos + 4]) as usize;
        &data[pos + 4 + klen..pos + 4 + klen + vlen]
    }

    /// Занятые байты узла.
    pub fn nbytes(&self) -> usize {
        self.kv_pos(self.nkeys())
    }

    /// Наибольший слот i с key(i) <= key. Слот 0 — это либо sentinel
    /// (пустой ключ), либо нижняя граница поддиапазона, поэтому скан
    /// начинается с 1 и результат всегда валиден.
    pub fn lookup_le(&self, key: &[u8]) -> u16 {
        let mut found = 0u16;
        for i in 1..self.nkeys() {
            match self.key(i).cmp(key) {
                Ordering::Less => found = i,
                Ordering::Equal => return i,
                Ordering::Greater => break,
            }
        }
        found
    }
}

// ----------------- сборка узла -----------------

impl<B: AsRef<[u8]> + AsMut<[u8]>> BNode<B> {
    pub fn set_header(&mut self, btype: u16, nkeys: u16) {
        assert!(
            btype == BNODE_NODE || btype == BNODE_LEAF,
            "bad node type {}",
            btype
        );
        let data = self.data.as_mut();
        LittleEndian::write_u16(&mut data[0..2], btype);
        LittleEndian::write_u16(&mut data[2..4], nkeys);
    }

    pub fn set_ptr(&mut self, idx: u16, ptr: u64) {
        assert!(idx < self.nkeys(), "ptr slot {} out of range", idx);
        let pos = HEADER + 8 * idx as usize;
        LittleEndian::write_u64(&mut self.data.as_mut()[pos..pos + 8], ptr);
    }

    fn set_offset(&mut self, idx: u16, offset: u16) {
        let pos = self.offset_pos(idx);
        LittleEndian::write_u16(&mut self.data.as_mut()[pos..pos + 2], offset);
    }

    /// Дописать запись в слот idx (строго по возрастанию idx) и обновить
    /// offset следующего слота.
    pub fn append_kv(&mut self, idx: u16, ptr: u64, key: &[u8], val: &[u8]) {
        self.set_ptr(idx, ptr);
        let pos = self.kv_pos(idx);
        let data = self.data.as_mut();
        LittleEndian::write_u16(&mut data[pos..pos + 2], key.len() as u16);
        LittleEndian::write_u16(&mut data[pos + 2..pos + 4], val.len() as u16);
        data[pos + 4..pos + 4 + key.len()].copy_from_slice(key);
        data[pos + 4 + key.len()..pos + 4 + key.len() + val.len()].copy_from_slice(val);
        let next = self.offset(idx) as usize + 4 + key.len() + val.len();
        self.set_offset(idx + 1, next as u16);
    }

    /// Скопировать n подряд идущих записей (указатель + ключ + значение)
    /// из src, сдвинув offsets на разницу начальных позиций. Примитив под
    /// всеми структурными перестройками.
    pub fn append_range<C: AsRef<[u8]>>(&mut self, src: &BNode<C>, dst_new: u16, src_old: u16, n: u16) {
        assert!(src_old + n <= src.nkeys(), "source range out of bounds");
        assert!(dst_new + n <= self.nkeys(), "destination range out of bounds");
        if n == 0 {
            return;
        }
        // Указатели
        for i in 0..n {
            self.set_ptr(dst_new + i, src.ptr(src_old + i));
        }
        // Offsets: перенос с поправкой на разницу начал регионов
        let dst_begin = self.offset(dst_new) as i64;
        let src_begin = src.offset(src_old) as i64;
        for i in 1..=n {
            let off = dst_begin - src_begin + src.offset(src_old + i) as i64;
            self.set_offset(dst_new + i, off as u16);
        }
        // Сами KV-байты одним куском
        let begin = src.kv_pos(src_old);
        let end = src.kv_pos(src_old + n);
        let dst_pos = self.kv_pos(dst_new);
        self.data.as_mut()[dst_pos..dst_pos + (end - begin)]
            .copy_from_slice(&src.data.as_ref()[begin..end]);
    }
}

// ----------------- перестройки листьев и узлов -----------------

/// Новый лист со вставкой (key, val) в слот idx; остальные сдвигаются.
pub fn leaf_insert(new: &mut BNode, old: &BNode, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(BNODE_LEAF, old.nkeys() + 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, 0, key, val);
    new.append_range(old, idx + 1, idx, old.nkeys() - idx);
}

/// Новый лист с заменой значения в слоте idx.
pub fn leaf_update(new: &mut BNode, old: &BNode, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(BNODE_LEAF, old.nkeys());
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, 0, key, val);
    new.append_range(old, idx + 1, idx + 1, old.nkeys() - idx - 1);
}

/// Новый лист без записи в слоте idx.
pub fn leaf_delete(new: &mut BNode, old: &BNode, idx: u16) {
    new.set_header(BNODE_LEAF, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_range(old, idx, idx + 1, old.nkeys() - idx - 1);
}

/// Склейка двух соседей (листьев или внутренних) в один узел.
pub fn node_merge(new: &mut BNode, left: &BNode, right: &BNode) {
    new.set_header(left.btype(), left.nkeys() + right.nkeys());
    new.append_range(left, 0, 0, left.nkeys());
    new.append_range(right, left.nkeys(), 0, right.nkeys());
}

/// Замена двух соседних ссылок (idx, idx+1) одной — после merge детей.
pub fn node_replace_2_kid(new: &mut BNode, old: &BNode, idx: u16, ptr: u64, key: &[u8]) {
    new.set_header(old.btype(), old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, ptr, key, old.val(idx));
    new.append_range(old, idx + 1, idx + 2, old.nkeys() - (idx + 2));
}

// ----------------- тестовые помощники -----------------

/// Сборка листа из готовых пар (для юнит-тестов кодека и сплита).
#[cfg(test)]
pub(crate) fn build_leaf(pairs: &[(&[u8], &[u8])]) -> BNode {
    let mut node = BNode::scratch();
    node.set_header(BNODE_LEAF, 0);
    for (i, (key, val)) in pairs.iter().enumerate() {
        let mut grown = BNode::scratch();
        leaf_insert(&mut grown, &node, i as u16, key, val);
        node = grown;
    }
    node
}
