//! db/kv — операции set/get/del: валидация, мутация дерева,
//! коммит-или-откат.

use anyhow::{anyhow, Result};

use crate::meta::Meta;

use super::core::Db;

impl Db {
    /// Записать пару ключ/значение. Транзакционно: либо закоммичено и
    /// долговечно, либо не применено вовсе.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(anyhow!("empty key is not allowed"));
        }
        let snap = self.pager.snapshot(self.tree.root());
        // Лимиты проверяются до каких-либо изменений состояния.
        self.tree.insert(&mut self.pager, key, val)?;
        self.update_or_revert(snap)
    }

    /// Значение по ключу; None — ключа нет.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(anyhow!("empty key is not allowed"));
        }
        Ok(self.tree.get(&self.pager, key))
    }

    /// Удалить ключ; false — ключа не было (состояние не менялось,
    /// коммит не нужен).
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        if key.is_empty() {
            return Err(anyhow!("empty key is not allowed"));
        }
        let snap = self.pager.snapshot(self.tree.root());
        if !self.tree.delete(&mut self.pager, key) {
            return Ok(false);
        }
        self.update_or_revert(snap)?;
        Ok(true)
    }

    /// Двухфазное завершение: при сбое коммита откатываемся к снапшоту.
    /// Meta на диске не переписана, так что следующее открытие увидит
    /// состояние до транзакции; записанный сверх него хвост — мусор.
    fn update_or_revert(&mut self, snap: Meta) -> Result<()> {
        if let Err(err) = self.pager.commit(self.tree.root()) {
            log::warn!("commit failed, reverting: {:#}", err);
            self.tree.set_root(snap.root);
            self.pager.revert(&snap);
            return Err(err);
        }
        Ok(())
    }
}
