//! pager/io — низкоуровневый страничный ввод/вывод:
//! - разрешение номера страницы в байты: updates → temp → mmap;
//! - staging новых страниц (temp) и отложенных правок на месте (updates);
//! - окно mmap из списка чанков: стартовое покрытие, рост удвоением;
//! - позиционные чтение/запись и fsync.
//!
//! Чтения идут через mmap, записи — через файловый дескриптор: и то и
//! другое когерентно (один page cache). Чанки только читаются, поэтому
//! старые чанки при росте окна остаются валидными — ремапа нет.

use anyhow::{Context, Result};
use memmap2::{Mmap, MmapOptions};
use std::collections::HashMap;
use std::fs::File;
use std::io;

use crate::consts::PAGE_SIZE;
use crate::free::FreePages;
use crate::meta::Meta;

pub(crate) struct PageIo {
    file: File,
    chunks: Vec<Mmap>,
    /// Сколько байт файла покрыто чанками.
    mapped: u64,
    /// База роста окна (начальный размер чанка).
    window: u64,
    /// Страницы, закоммиченные в файл (= позиция следующего append).
    pub(crate) flushed: u64,
    /// Новые страницы текущей транзакции, ещё не записанные.
    pub(crate) temp: Vec<Vec<u8>>,
    /// Отложенные правки существующих страниц (реюз и LNode free-list'а).
    pub(crate) updates: HashMap<u64, Vec<u8>>,
    /// fsync данных и meta при коммите (выключение — только для тестов).
    data_fsync: bool,
}

impl PageIo {
    pub(crate) fn new(file: File, file_size: u64, window: u64, data_fsync: bool) -> Result<Self> {
        let mut io = PageIo {
            file,
            chunks: Vec::new(),
            mapped: 0,
            window,
            flushed: 0,
            temp: Vec::new(),
            updates: HashMap::new(),
            data_fsync,
        };
        // Стартовое окно: не меньше файла, удваиваясь от базового размера.
        let mut alloc = window;
        while alloc < file_size {
            alloc *= 2;
        }
        io.map_chunk(alloc)?;
        Ok(io)
    }

    fn map_chunk(&mut self, len: u64) -> Result<()> {
        // SAFETY: файл открыт этим процессом эксклюзивно (advisory lock),
        // пишет в него только этот же хендл, чанк живёт не дольше PageIo,
        // а любое чтение страницы проверяет ptr < flushed + len(temp), так
        // что за пределы записанных данных доступа нет.
        let chunk = unsafe {
            MmapOptions::new()
                .offset(self.mapped)
                .len(len as usize)
                .map(&self.file)
        }
        .with_context(|| format!("mmap chunk at {} len {}", self.mapped, len))?;
        self.chunks.push(chunk);
        self.mapped += len;
        Ok(())
    }

    /// Гарантировать, что окно mmap покрывает первые npages страниц.
    pub(crate) fn extend_mmap(&mut self, npages: u64) -> Result<()> {
        let need = npages * PAGE_SIZE as u64;
        if need <= self.mapped {
            return Ok(());
        }
        let mut alloc = self.mapped.max(self.window);
        while self.mapped + alloc < need {
            alloc *= 2;
        }
        self.map_chunk(alloc)
    }

    /// Страниц всего: закоммиченные + append-хвост транзакции.
    pub(crate) fn npages(&self) -> u64 {
        self.flushed + self.temp.len() as u64
    }

    // ----------------- чтение -----------------

    /// Текущие байты страницы: staged-правка → хвост транзакции → файл.
    pub(crate) fn page_bytes(&self, ptr: u64) -> &[u8] {
        if let Some(page) = self.updates.get(&ptr) {
            return page;
        }
        if ptr >= self.flushed {
            let i = (ptr - self.flushed) as usize;
            return match self.temp.get(i) {
                Some(page) => page,
                None => panic!("bad page {}", ptr),
            };
        }
        self.file_page(ptr)
    }

    /// Закоммиченная страница через mmap-чанки.
    fn file_page(&self, ptr: u64) -> &[u8] {
        assert!(ptr < self.flushed, "bad page {}", ptr);
        let mut start = 0u64;
        for chunk in &self.chunks {
            let end = start + (chunk.len() / PAGE_SIZE) as u64;
            if ptr < end {
                let off = ((ptr - start) as usize) * PAGE_SIZE;
                return &chunk[off..off + PAGE_SIZE];
            }
            start = end;
        }
        panic!("page {} beyond mmap window", ptr);
    }

    /// Чтение страницы напрямую из файла, мимо mmap. Нужно при открытии:
    /// meta читается раньше, чем известен flushed.
    pub(crate) fn read_page_direct(&self, ptr: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; PAGE_SIZE];
        read_exact_at(&self.file, &mut buf, ptr * PAGE_SIZE as u64)
            .with_context(|| format!("read page {}", ptr))?;
        Ok(buf)
    }

    // ----------------- staging -----------------

    /// Поставить новую страницу в append-хвост; вернуть её номер.
    pub(crate) fn page_append(&mut self, page: Vec<u8>) -> u64 {
        assert_eq!(page.len(), PAGE_SIZE, "page buffer must be {} bytes", PAGE_SIZE);
        let ptr = self.flushed + self.temp.len() as u64;
        self.temp.push(page);
        ptr
    }

    /// Отложенная перезапись закоммиченной страницы новым содержимым
    /// (реюз номера из free-list'а).
    pub(crate) fn stage_update(&mut self, ptr: u64, page: Vec<u8>) {
        assert_eq!(page.len(), PAGE_SIZE, "page buffer must be {} bytes", PAGE_SIZE);
        assert!(ptr < self.flushed, "staged update for uncommitted page {}", ptr);
        self.updates.insert(ptr, page);
    }

    /// Снять staged-содержимое (страница уходит в free-list).
    pub(crate) fn drop_update(&mut self, ptr: u64) {
        self.updates.remove(&ptr);
    }

    /// Буфер страницы под правку на месте (free-list). Закоммиченная
    /// страница копируется в updates при первом касании; страница из
    /// append-хвоста правится прямо в своём pending-буфере.
    pub(crate) fn page_write(&mut self, ptr: u64) -> &mut [u8] {
        if ptr >= self.flushed {
            let i = (ptr - self.flushed) as usize;
            return match self.temp.get_mut(i) {
                Some(page) => page,
                None => panic!("bad page {}", ptr),
            };
        }
        if !self.updates.contains_key(&ptr) {
            let copy = self.file_page(ptr).to_vec();
            self.updates.insert(ptr, copy);
        }
        self.updates.get_mut(&ptr).expect("staged right above")
    }

    // ----------------- запись и откат -----------------

    /// Записать все staged-страницы и fsync; продвинуть flushed и очистить
    /// staging. Вызывается строго до перезаписи meta: данные становятся
    /// долговечными раньше ссылки на них.
    pub(crate) fn flush_pages(&mut self) -> Result<()> {
        self.extend_mmap(self.npages())?;

        // правки на месте — по своим смещениям
        let mut staged: Vec<u64> = self.updates.keys().copied().collect();
        staged.sort_unstable();
        for ptr in staged {
            let page = &self.updates[&ptr];
            write_all_at(&self.file, page, ptr * PAGE_SIZE as u64)
                .with_context(|| format!("write staged page {}", ptr))?;
        }
        // append-хвост — непрерывным участком с позиции flushed
        for (i, page) in self.temp.iter().enumerate() {
            let ptr = self.flushed + i as u64;
            write_all_at(&self.file, page, ptr * PAGE_SIZE as u64)
                .with_context(|| format!("write appended page {}", ptr))?;
        }
        if self.data_fsync {
            self.file.sync_all().context("fsync data pages")?;
        }

        self.flushed += self.temp.len() as u64;
        self.temp.clear();
        self.updates.clear();
        Ok(())
    }

    /// Перезаписать meta-страницу (страница 0) и fsync.
    pub(crate) fn write_meta(&mut self, meta: &Meta) -> Result<()> {
        write_all_at(&self.file, &meta.encode(), 0).context("write meta page")?;
        if self.data_fsync {
            self.file.sync_all().context("fsync meta page")?;
        }
        Ok(())
    }

    /// Откат неудавшегося коммита: staging отбрасывается, flushed
    /// возвращается к снапшоту. Записанные сверх него страницы остаются
    /// в файле недостижимым мусором — meta на диске их не видит.
    pub(crate) fn rollback(&mut self, flushed: u64) {
        self.flushed = flushed;
        self.temp.clear();
        self.updates.clear();
    }
}

impl FreePages for PageIo {
    fn page_bytes(&self, ptr: u64) -> &[u8] {
        PageIo::page_bytes(self, ptr)
    }

    fn page_append(&mut self, page: Vec<u8>) -> u64 {
        PageIo::page_append(self, page)
    }

    fn page_write(&mut self, ptr: u64) -> &mut [u8] {
        PageIo::page_write(self, ptr)
    }
}

// ----------------- позиционный ввод/вывод -----------------

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
