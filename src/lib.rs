#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod consts;
pub mod lock;
pub mod meta;

// Ядро хранилища
pub mod db; // src/db/{mod,core,open,kv}.rs
pub mod free;
pub mod node; // src/node/{mod,split}.rs
pub mod pager; // src/pager/{mod,core,io,alloc,commit}.rs
pub mod tree; // src/tree/{mod,insert,delete}.rs

// Удобные реэкспорты
pub use config::StoreConfig;
pub use db::Db;
pub use meta::Meta;
pub use node::BNode;
pub use tree::{BTree, PageStore};
