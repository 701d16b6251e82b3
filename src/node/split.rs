//! node/split — разрез переполненного узла на 1..=3 страницы.

use crate::consts::{HEADER, PAGE_SIZE};

use super::BNode;

/// Разрез old на (left, right) так, чтобы правая половина гарантированно
/// влезла в страницу. Начальное приближение — половина ключей; затем nleft
/// уменьшается, пока левая проекция не влезает, и увеличивается, пока не
/// влезает правая. left может остаться больше страницы (режется ещё раз
/// в node_split3).
pub fn node_split2(left: &mut BNode, right: &mut BNode, old: &BNode) {
    assert!(old.nkeys() >= 2, "node too short to split");

    let mut nleft = old.nkeys() / 2;
    // Проекция размера левой половины: заголовок + указатели + offsets + KV.
    let left_bytes = |n: u16| HEADER + 10 * n as usize + old.offset(n) as usize;
    while left_bytes(nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    assert!(nleft >= 1, "left half cannot be empty");

    let right_bytes = |n: u16| old.nbytes() - left_bytes(n) + HEADER;
    while right_bytes(nleft) > PAGE_SIZE {
        nleft += 1;
    }
    assert!(nleft < old.nkeys(), "right half cannot be empty");
    let nright = old.nkeys() - nleft;

    left.set_header(old.btype(), nleft);
    right.set_header(old.btype(), nright);
    left.append_range(old, 0, 0, nleft);
    right.append_range(old, 0, nleft, nright);

    assert!(right.nbytes() <= PAGE_SIZE, "right half overflows page");
}

/// Разрез рабочего узла (до 2x страницы) на 1, 2 или 3 страницы.
pub fn node_split3(old: BNode) -> Vec<BNode> {
    if old.nbytes() <= PAGE_SIZE {
        return vec![old];
    }

    let mut left = BNode::scratch();
    let mut right = BNode::page();
    node_split2(&mut left, &mut right, &old);
    if left.nbytes() <= PAGE_SIZE {
        return vec![left, right];
    }

    // Левая половина всё ещё велика: режем её ещё раз.
    let mut leftleft = BNode::page();
    let mut middle = BNode::page();
    node_split2(&mut leftleft, &mut middle, &left);
    assert!(leftleft.nbytes() <= PAGE_SIZE, "double split failed to fit");
    vec![leftleft, middle, right]
}
