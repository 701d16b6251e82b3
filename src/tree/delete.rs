//! tree/delete — удаление: COW-спуск, на обратном пути — слияние
//! недозаполненного ребёнка с соседом, схлопывание корня при усыхании.

use crate::consts::{BNODE_LEAF, BNODE_NODE, HEADER, MERGE_THRESHOLD, PAGE_SIZE};
use crate::node::{leaf_delete, node_merge, node_replace_2_kid, BNode};

use super::{node_replace_kid_n, BTree, PageStore};

/// Решение о слиянии обновлённого ребёнка с соседом.
pub(crate) enum Merge {
    No,
    Left(BNode),
    Right(BNode),
}

impl BTree {
    /// Удалить ключ. false — ключа не было (дерево не тронуто).
    pub fn delete(&mut self, store: &mut impl PageStore, key: &[u8]) -> bool {
        if self.root == 0 {
            return false;
        }
        let root = store.read_node(self.root);
        let updated = match tree_delete(store, &root, key) {
            Some(node) => node,
            None => return false,
        };
        store.page_free(self.root);

        if updated.btype() == BNODE_NODE && updated.nkeys() == 1 {
            // Внутренний корень с единственным ребёнком: высота
            // уменьшается, корнем становится ребёнок.
            self.root = updated.ptr(0);
        } else {
            self.root = store.page_alloc(updated);
        }
        true
    }
}

fn tree_delete(store: &mut impl PageStore, node: &BNode, key: &[u8]) -> Option<BNode> {
    let idx = node.lookup_le(key);
    match node.btype() {
        BNODE_LEAF => {
            if node.key(idx) != key {
                return None;
            }
            let mut new = BNode::page();
            leaf_delete(&mut new, node, idx);
            Some(new)
        }
        BNODE_NODE => node_delete(store, node, idx, key),
        other => panic!("bad node type {}", other),
    }
}

fn node_delete(store: &mut impl PageStore, node: &BNode, idx: u16, key: &[u8]) -> Option<BNode> {
    let kptr = node.ptr(idx);
    let kid = store.read_node(kptr);
    let updated = tree_delete(store, &kid, key)?;
    store.page_free(kptr);

    let mut new = BNode::page();
    match should_merge(store, node, idx, &updated) {
        Merge::Left(sibling) => {
            let mut merged = BNode::page();
            node_merge(&mut merged, &sibling, &updated);
            store.page_free(node.ptr(idx - 1));
            let first = merged.key(0).to_vec();
            let ptr = store.page_alloc(merged);
            node_replace_2_kid(&mut new, node, idx - 1, ptr, &first);
        }
        Merge::Right(sibling) => {
            let mut merged = BNode::page();
            node_merge(&mut merged, &updated, &sibling);
            store.page_free(node.ptr(idx + 1));
            let first = merged.key(0).to_vec();
            let ptr = store.page_alloc(merged);
            node_replace_2_kid(&mut new, node, idx, ptr, &first);
        }
        Merge::No if updated.nkeys() == 0 => {
            // Опустеть может только единственный ребёнок: любой другой
            // гарантированно сливается с соседом.
            assert!(node.nkeys() == 1 && idx == 0, "empty child with siblings");
            new.set_header(node.btype(), 0);
        }
        Merge::No => {
            node_replace_kid_n(store, &mut new, node, idx, vec![updated]);
        }
    }
    Some(new)
}

/// Слияние рассматривается только для недозаполненного ребёнка и только
/// если склейка с соседом влезает в страницу.
pub(crate) fn should_merge(
    store: &impl PageStore,
    node: &BNode,
    idx: u16,
    updated: &BNode,
) -> Merge {
    if updated.nbytes() > MERGE_THRESHOLD {
        return Merge::No;
    }
    if idx > 0 {
        let sibling = store.read_node(node.ptr(idx - 1));
        if sibling.nbytes() + updated.nbytes() - HEADER <= PAGE_SIZE {
            return Merge::Left(sibling);
        }
    }
    if idx + 1 < node.nkeys() {
        let sibling = store.read_node(node.ptr(idx + 1));
        if sibling.nbytes() + updated.nbytes() - HEADER <= PAGE_SIZE {
            return Merge::Right(sibling);
        }
    }
    Merge::No
}
