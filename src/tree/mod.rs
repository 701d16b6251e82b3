//! tree — copy-on-write B+ дерево поверх абстракции страничного хранилища.
//!
//! Дерево не знает про файлы и mmap: вся работа со страницами идёт через
//! PageStore. Pager реализует его поверх файла; юнит-тесты — поверх HashMap.
//!
//! Контракт COW: мутация строит свежие страницы для всего пути от корня до
//! листа; старые номера отдаются в page_free. На месте не правится ничего.

use crate::consts::{BNODE_LEAF, BNODE_NODE};
use crate::node::BNode;

mod delete;
mod insert;

pub(crate) use insert::node_replace_kid_n;

/// Страничное хранилище, каким его видит дерево.
///
/// Неверный номер страницы, узел больше страницы, неизвестный тип узла —
/// программные ошибки: паника, а не Result.
pub trait PageStore {
    /// Текущие байты страницы ptr.
    fn page_bytes(&self, ptr: u64) -> &[u8];
    /// Разместить узел; вернуть назначенный номер страницы.
    fn page_alloc(&mut self, node: BNode) -> u64;
    /// Отдать страницу на переиспользование.
    fn page_free(&mut self, ptr: u64);

    /// Владеющая копия узла (мутирующие пути работают с копиями).
    fn read_node(&self, ptr: u64) -> BNode {
        BNode::from_page(self.page_bytes(ptr))
    }
}

/// Корень B+ дерева. root == 0 — пустое дерево.
pub struct BTree {
    root: u64,
}

impl BTree {
    pub fn new() -> Self {
        BTree { root: 0 }
    }

    pub fn with_root(root: u64) -> Self {
        BTree { root }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: u64) {
        self.root = root;
    }

    /// Точечный поиск. Спуск по заимствованным представлениям страниц,
    /// без копирования узлов.
    pub fn get(&self, store: &impl PageStore, key: &[u8]) -> Option<Vec<u8>> {
        if self.root == 0 {
            return None;
        }
        let mut ptr = self.root;
        loop {
            let node = BNode::view(store.page_bytes(ptr));
            let idx = node.lookup_le(key);
            match node.btype() {
                BNODE_LEAF => {
                    if node.key(idx) == key {
                        return Some(node.val(idx).to_vec());
                    }
                    return None;
                }
                BNODE_NODE => ptr = node.ptr(idx),
                other => panic!("bad node type {}", other),
            }
        }
    }
}

impl Default for BTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{MAX_KEY_SIZE, MAX_VAL_SIZE, MERGE_THRESHOLD, PAGE_SIZE};
    use crate::node::BNode;
    use rand::prelude::*;
    use std::collections::HashMap;

    /// Страничное хранилище в памяти: номера страниц — счётчик,
    /// page_free двойного освобождения не прощает.
    pub(super) struct MemPages {
        pub pages: HashMap<u64, Vec<u8>>,
        next: u64,
    }

    impl MemPages {
        pub fn new() -> Self {
            MemPages {
                pages: HashMap::new(),
                next: 1,
            }
        }
    }

    impl PageStore for MemPages {
        fn page_bytes(&self, ptr: u64) -> &[u8] {
            self.pages
                .get(&ptr)
                .unwrap_or_else(|| panic!("bad page {}", ptr))
        }

        fn page_alloc(&mut self, node: BNode) -> u64 {
            let page = node.into_page();
            let ptr = self.next;
            self.next += 1;
            self.pages.insert(ptr, page);
            ptr
        }

        fn page_free(&mut self, ptr: u64) {
            assert!(self.pages.remove(&ptr).is_some(), "free of bad page {}", ptr);
        }
    }

    struct Harness {
        tree: BTree,
        store: MemPages,
        reference: HashMap<Vec<u8>, Vec<u8>>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                tree: BTree::new(),
                store: MemPages::new(),
                reference: HashMap::new(),
            }
        }

        fn add(&mut self, key: &str, val: &str) {
            self.tree
                .insert(&mut self.store, key.as_bytes(), val.as_bytes())
                .unwrap();
            self.reference
                .insert(key.as_bytes().to_vec(), val.as_bytes().to_vec());
        }

        fn del(&mut self, key: &str) -> bool {
            let deleted = self.tree.delete(&mut self.store, key.as_bytes());
            if deleted {
                self.reference.remove(key.as_bytes());
            }
            deleted
        }

        fn root(&self) -> BNode {
            self.store.read_node(self.tree.root())
        }

        /// Инварианты дерева: ключи в узле строго возрастают, каждый узел
        /// влезает в страницу, все листья на одной глубине.
        fn check(&self) {
            if self.tree.root() == 0 {
                return;
            }
            let mut leaf_depth = None;
            self.check_node(self.tree.root(), 0, &mut leaf_depth);
            // заодно сверка с эталоном по всем живым ключам
            for (key, val) in &self.reference {
                assert_eq!(self.tree.get(&self.store, key).as_deref(), Some(val.as_slice()));
            }
        }

        fn check_node(&self, ptr: u64, depth: usize, leaf_depth: &mut Option<usize>) {
            let node = self.store.read_node(ptr);
            assert!(node.nbytes() <= PAGE_SIZE, "node exceeds page");
            for i in 1..node.nkeys() {
                assert!(node.key(i - 1) < node.key(i), "keys out of order");
            }
            match node.btype() {
                BNODE_LEAF => match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(d) => assert_eq!(d, depth, "leaves at different depths"),
                },
                BNODE_NODE => {
                    assert!(node.nkeys() > 0, "empty internal node");
                    for i in 0..node.nkeys() {
                        self.check_node(node.ptr(i), depth + 1, leaf_depth);
                    }
                }
                other => panic!("bad node type {}", other),
            }
        }
    }

    #[test]
    fn insert_single_key() {
        let mut h = Harness::new();
        h.add("k1", "hello");

        let root = h.root();
        // лист из sentinel-записи и самого ключа
        assert_eq!(root.btype(), BNODE_LEAF);
        assert_eq!(root.nkeys(), 2);
        assert_eq!(root.key(0), b"");
        assert_eq!(root.val(0), b"");
        assert_eq!(root.key(1), b"k1");
        assert_eq!(root.val(1), b"hello");
    }

    #[test]
    fn insert_duplicate_updates_value() {
        let mut h = Harness::new();
        h.add("k1", "val1");
        h.add("k1", "val2");

        let root = h.root();
        assert_eq!(root.nkeys(), 2);
        assert_eq!(root.val(1), b"val2");
        assert_eq!(
            h.tree.get(&h.store, b"k1").as_deref(),
            Some(b"val2" as &[u8])
        );
    }

    #[test]
    fn insert_ordered_fill() {
        let mut h = Harness::new();
        h.add("k1", "val1");
        h.add("k2", "val2");
        h.add("k3", "val3");

        let root = h.root();
        assert_eq!(root.nkeys(), 4); // 3 ключа + sentinel
        assert_eq!(root.key(1), b"k1");
        assert_eq!(root.val(1), b"val1");
        assert_eq!(root.key(2), b"k2");
        assert_eq!(root.key(3), b"k3");
    }

    #[test]
    fn insert_split_and_promote() {
        let mut h = Harness::new();
        let val = "v".repeat(150);
        for i in 0..25 {
            h.add(&format!("k{:02}", i), &val);
        }
        h.check();

        let root = h.root();
        assert_eq!(root.btype(), BNODE_NODE);
        assert!(root.nkeys() > 1);

        // середина на k12: k00..k11 слева, k12..k24 справа
        assert_eq!(root.lookup_le(b"k11"), 0);
        assert_eq!(root.lookup_le(b"k12"), 1);
    }

    #[test]
    fn get_missing_key() {
        let mut h = Harness::new();
        h.add("k1", "val1");
        assert_eq!(h.tree.get(&h.store, b"nope"), None);
        assert_eq!(h.tree.get(&h.store, b"k0"), None);
        assert_eq!(h.tree.get(&h.store, b"k2"), None);
    }

    #[test]
    fn delete_nonexistent_key() {
        let mut h = Harness::new();
        h.add("k1", "val1");

        assert!(!h.del("does-not-exist"));
        assert_eq!(
            h.tree.get(&h.store, b"k1").as_deref(),
            Some(b"val1" as &[u8])
        );
    }

    #[test]
    fn delete_existing_key() {
        let mut h = Harness::new();
        h.add("k1", "val1");
        h.add("k2", "val2");

        assert!(h.del("k1"));
        let root = h.root();
        assert_eq!(root.nkeys(), 2); // sentinel + k2
        assert_eq!(root.key(1), b"k2");
        assert_eq!(h.tree.get(&h.store, b"k1"), None);
    }

    #[test]
    fn delete_below_root() {
        let mut h = Harness::new();
        let val = "v".repeat(150);
        for i in 0..25 {
            h.add(&format!("k{:02}", i), &val);
        }

        assert!(h.del("k01"));
        h.check();

        let root = h.root();
        let kid = h.store.read_node(root.ptr(0));
        assert_ne!(kid.key(1), b"k01");
    }

    #[test]
    fn should_merge_rules() {
        use super::delete::{should_merge, Merge};
        use crate::consts::HEADER;
        use crate::node::build_leaf;

        // лист с sentinel и count ключами по val_len байт значения
        fn leaf(count: usize, val_len: usize) -> BNode {
            let keys: Vec<Vec<u8>> = (1..=count).map(|i| format!("k{:02}", i).into_bytes()).collect();
            let val = vec![b'v'; val_len];
            let mut pairs: Vec<(&[u8], &[u8])> = vec![(b"", b"")];
            pairs.extend(keys.iter().map(|k| (k.as_slice(), val.as_slice())));
            build_leaf(&pairs)
        }

        let mut store = MemPages::new();
        store.pages.insert(101, leaf(2, 100).into_page());
        store.pages.insert(102, leaf(1, 50).into_page());
        store.pages.insert(103, leaf(2, 100).into_page());

        let mut parent = BNode::page();
        parent.set_header(BNODE_NODE, 3);
        parent.append_kv(0, 101, b"a", b"");
        parent.append_kv(1, 102, b"b", b"");
        parent.append_kv(2, 103, b"c", b"");

        let updated_small = store.read_node(102);
        assert!(updated_small.nbytes() <= MERGE_THRESHOLD);

        // обновлённый узел выше порога недозаполненности — не сливается
        let updated_large = leaf(10, 200);
        assert!(updated_large.nbytes() > MERGE_THRESHOLD);
        assert!(matches!(
            should_merge(&store, &parent, 1, &updated_large),
            Merge::No
        ));

        // маленький — сливается с левым соседом
        assert!(matches!(
            should_merge(&store, &parent, 1, &updated_small),
            Merge::Left(_)
        ));

        // соседи настолько толстые, что склейка не влезла бы в страницу
        let fat = leaf(17, 220);
        assert!(fat.nbytes() <= PAGE_SIZE);
        assert!(fat.nbytes() + updated_small.nbytes() - HEADER > PAGE_SIZE);
        store.pages.insert(101, fat.into_page());
        let fat = leaf(17, 220);
        store.pages.insert(103, fat.into_page());
        assert!(matches!(
            should_merge(&store, &parent, 1, &updated_small),
            Merge::No
        ));

        // левого соседа нет — сливаемся с правым
        store.pages.insert(103, leaf(2, 100).into_page());
        let mut parent2 = BNode::page();
        parent2.set_header(BNODE_NODE, 2);
        parent2.append_kv(0, 102, b"a", b"");
        parent2.append_kv(1, 103, b"b", b"");
        assert!(matches!(
            should_merge(&store, &parent2, 0, &updated_small),
            Merge::Right(_)
        ));
    }

    #[test]
    fn delete_triggers_merge_and_root_collapse() {
        let mut h = Harness::new();
        let val = "v".repeat(150);
        for i in 0..25 {
            h.add(&format!("k{:02}", i), &val);
        }
        assert_eq!(h.root().btype(), BNODE_NODE);

        for i in 1..25 {
            assert!(h.del(&format!("k{:02}", i)));
            h.check();
        }

        // корень схлопнулся обратно в лист с единственным ключом
        let root = h.root();
        assert_eq!(root.btype(), BNODE_LEAF);
        assert_eq!(root.nkeys(), 2);
        assert_eq!(root.key(1), b"k00");
    }

    #[test]
    fn size_limits_are_enforced() {
        let mut h = Harness::new();

        let key_ok = vec![b'k'; MAX_KEY_SIZE];
        let val_ok = vec![b'v'; MAX_VAL_SIZE];
        h.tree.insert(&mut h.store, &key_ok, &val_ok).unwrap();
        assert_eq!(
            h.tree.get(&h.store, &key_ok).as_deref(),
            Some(val_ok.as_slice())
        );

        let key_big = vec![b'k'; MAX_KEY_SIZE + 1];
        assert!(h.tree.insert(&mut h.store, &key_big, b"v").is_err());

        let val_big = vec![b'v'; MAX_VAL_SIZE + 1];
        assert!(h.tree.insert(&mut h.store, b"k", &val_big).is_err());
    }

    #[test]
    fn no_leaked_or_double_used_pages() {
        let mut h = Harness::new();
        let val = "v".repeat(120);
        for i in 0..60 {
            h.add(&format!("key{:03}", i), &val);
        }
        for i in (0..60).step_by(2) {
            assert!(h.del(&format!("key{:03}", i)));
        }
        h.check();

        // достижимые страницы == все живые страницы (ничего не потеряно,
        // ничего не используется дважды)
        let mut reachable = Vec::new();
        fn walk(store: &MemPages, ptr: u64, out: &mut Vec<u64>) {
            out.push(ptr);
            let node = store.read_node(ptr);
            if node.btype() == BNODE_NODE {
                for i in 0..node.nkeys() {
                    walk(store, node.ptr(i), out);
                }
            }
        }
        walk(&h.store, h.tree.root(), &mut reachable);
        let mut unique = reachable.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), reachable.len(), "page referenced twice");
        assert_eq!(unique.len(), h.store.pages.len(), "leaked pages");
    }

    #[test]
    fn random_ops_match_reference() {
        let mut h = Harness::new();
        let mut rng = StdRng::seed_from_u64(42);

        for step in 0..2000 {
            let k = rng.gen_range(0..300);
            let key = format!("key{:03}", k);
            if rng.gen_bool(0.6) {
                let len = rng.gen_range(0..600);
                let val: String = (0..len).map(|_| rng.gen_range('a'..='z')).collect();
                h.add(&key, &val);
            } else {
                let expected = h.reference.contains_key(key.as_bytes());
                assert_eq!(h.del(&key), expected);
            }
            if step % 250 == 0 {
                h.check();
            }
        }
        h.check();

        for k in 0..300 {
            let key = format!("key{:03}", k);
            assert_eq!(
                h.tree.get(&h.store, key.as_bytes()),
                h.reference.get(key.as_bytes()).cloned()
            );
        }
    }
}
