//! pager/commit — транзакционное завершение мутации.
//!
//! Порядок шагов — единственная критичная для корректности
//! последовательность в хранилище:
//! [1] расширить окно mmap под новый хвост файла;
//! [2] записать все staged-страницы (updates + temp);
//! [3] fsync — данные долговечны до meta;
//! [4] flushed += len(temp), очистить staging;
//! [5] перезаписать meta (страница 0) с новым корнем;
//! [6] fsync — meta долговечна до продвижения горизонта free-list'а;
//! [7] free.set_max_seq() — освобождённое этой транзакцией станет
//!     доступным для реюза только следующей.
//!
//! Сбой на [1]..[6] оставляет на диске старую meta: записанные сверх неё
//! страницы — недостижимый мусор, восстановление их не увидит.

use anyhow::Result;

use super::core::Pager;

impl Pager {
    pub(crate) fn commit(&mut self, root: u64) -> Result<()> {
        // [1]..[4]
        self.io.flush_pages()?;
        // [5]..[6] — flushed уже продвинут, снапшот описывает новое состояние
        let meta = self.snapshot(root);
        self.io.write_meta(&meta)?;
        // [7]
        self.free.set_max_seq();
        Ok(())
    }
}
