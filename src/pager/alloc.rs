//! pager/alloc — реализация PageStore: аллокация и освобождение страниц.

use crate::node::BNode;
use crate::tree::PageStore;

use super::core::Pager;

impl PageStore for Pager {
    fn page_bytes(&self, ptr: u64) -> &[u8] {
        self.io.page_bytes(ptr)
    }

    /// Сначала free-list, иначе append. При реюзе содержимое ложится
    /// отложенной правкой под старым номером страницы.
    fn page_alloc(&mut self, node: BNode) -> u64 {
        let page = node.into_page();
        let ptr = self.free.pop_head(&mut self.io);
        if ptr != 0 {
            self.io.stage_update(ptr, page);
            return ptr;
        }
        self.io.page_append(page)
    }

    /// Освобождённый номер уходит в хвост free-list'а; его staged-буфер
    /// (если страница была переиспользована этой же транзакцией) снимается.
    fn page_free(&mut self, ptr: u64) {
        self.io.drop_update(ptr);
        self.free.push_tail(&mut self.io, ptr);
    }
}
