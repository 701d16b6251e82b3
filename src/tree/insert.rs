//! tree/insert — вставка/обновление: COW-спуск к листу, расщепление вверх
//! по пути, при необходимости — новый корень над продуктами сплита.

use anyhow::{bail, Result};

use crate::consts::{BNODE_LEAF, BNODE_NODE, MAX_KEY_SIZE, MAX_VAL_SIZE};
use crate::node::{leaf_insert, leaf_update, node_split3, BNode};

use super::{BTree, PageStore};

impl BTree {
    /// Вставить или обновить пару. Ошибки — только валидация лимитов,
    /// до каких-либо изменений состояния.
    pub fn insert(&mut self, store: &mut impl PageStore, key: &[u8], val: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            bail!("key too long: {} > {}", key.len(), MAX_KEY_SIZE);
        }
        if val.len() > MAX_VAL_SIZE {
            bail!("value too long: {} > {}", val.len(), MAX_VAL_SIZE);
        }

        if self.root == 0 {
            // Первая вставка: лист с sentinel-парой в слоте 0, чтобы
            // lookup_le на внутренних узлах всегда находил валидный слот.
            let mut root = BNode::page();
            root.set_header(BNODE_LEAF, 2);
            root.append_kv(0, 0, b"", b"");
            root.append_kv(1, 0, key, val);
            self.root = store.page_alloc(root);
            return Ok(());
        }

        let node = store.read_node(self.root);
        let grown = tree_insert(store, &node, key, val);
        let mut parts = node_split3(grown);
        store.page_free(self.root);

        if parts.len() > 1 {
            // Корень расщепился: над продуктами синтезируется новый
            // внутренний корень.
            let mut root = BNode::page();
            root.set_header(BNODE_NODE, parts.len() as u16);
            for (i, part) in parts.drain(..).enumerate() {
                let first = part.key(0).to_vec();
                let ptr = store.page_alloc(part);
                root.append_kv(i as u16, ptr, &first, b"");
            }
            self.root = store.page_alloc(root);
        } else {
            let only = parts.pop().expect("split yields at least one node");
            self.root = store.page_alloc(only);
        }
        Ok(())
    }
}

/// Рекурсивный спуск. Возвращает рабочий узел (до 2x страницы) — замену
/// node; расщепление и размещение — забота вызывающего уровня.
fn tree_insert(store: &mut impl PageStore, node: &BNode, key: &[u8], val: &[u8]) -> BNode {
    let mut new = BNode::scratch();
    let idx = node.lookup_le(key);
    match node.btype() {
        BNODE_LEAF => {
            if node.key(idx) == key {
                leaf_update(&mut new, node, idx, key, val);
            } else {
                leaf_insert(&mut new, node, idx + 1, key, val);
            }
        }
        BNODE_NODE => {
            let kptr = node.ptr(idx);
            let kid = store.read_node(kptr);
            let grown = tree_insert(store, &kid, key, val);
            let parts = node_split3(grown);
            store.page_free(kptr);
            node_replace_kid_n(store, &mut new, node, idx, parts);
        }
        other => panic!("bad node type {}", other),
    }
    new
}

/// Замена ссылки в слоте idx на len(kids) новых детей; ключ каждой ссылки —
/// наименьший ключ, достижимый под ребёнком.
pub(crate) fn node_replace_kid_n(
    store: &mut impl PageStore,
    new: &mut BNode,
    old: &BNode,
    idx: u16,
    kids: Vec<BNode>,
) {
    let inc = kids.len() as u16;
    new.set_header(old.btype(), old.nkeys() - 1 + inc);
    new.append_range(old, 0, 0, idx);
    for (i, kid) in kids.into_iter().enumerate() {
        let first = kid.key(0).to_vec();
        let ptr = store.page_alloc(kid);
        new.append_kv(idx + i as u16, ptr, &first, b"");
    }
    new.append_range(old, idx + inc, idx + 1, old.nkeys() - (idx + 1));
}
