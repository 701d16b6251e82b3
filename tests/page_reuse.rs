//! Переиспользование страниц: при стационарной нагрузке файл перестаёт
//! расти — освобождённые страницы возвращаются через free-list.

use anyhow::Result;
use std::path::PathBuf;

use BurrowDB::Db;

#[test]
fn churn_reaches_steady_state() -> Result<()> {
    let path = unique_path("reuse");
    let mut db = Db::open(&path)?;
    let val = vec![b'v'; 200];

    let mut after_warmup = 0u64;
    for cycle in 0..10 {
        for i in 0..50 {
            db.set(format!("churn-{:03}", i).as_bytes(), &val)?;
        }
        for i in 0..50 {
            assert!(db.del(format!("churn-{:03}", i).as_bytes())?);
        }
        if cycle == 4 {
            after_warmup = db.flushed_pages();
        }
    }
    let after_churn = db.flushed_pages();

    // после разогрева рост обязан прекратиться (небольшой люфт — на
    // осцилляции формы дерева и цепочки free-list'а)
    assert!(
        after_churn <= after_warmup + 8,
        "file keeps growing under churn: {} -> {} pages",
        after_warmup,
        after_churn
    );

    // целостность после цикла
    for i in 0..50 {
        assert_eq!(db.get(format!("churn-{:03}", i).as_bytes())?, None);
    }
    db.set(b"final", b"ok")?;
    assert_eq!(db.get(b"final")?.as_deref(), Some(b"ok" as &[u8]));
    db.close();

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[test]
fn overwrites_do_not_grow_file() -> Result<()> {
    let path = unique_path("overwrite");
    let mut db = Db::open(&path)?;

    db.set(b"k", b"seed")?;
    for _ in 0..3 {
        db.set(b"k", b"warm")?;
    }
    let warm = db.flushed_pages();

    for i in 0..200u32 {
        db.set(b"k", format!("value-{}", i).as_bytes())?;
    }
    assert_eq!(
        db.flushed_pages(),
        warm,
        "single-key overwrites must recycle pages, not append"
    );
    db.close();

    let _ = std::fs::remove_file(&path);
    Ok(())
}

fn unique_path(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("burrow-{}-{}-{}.db", prefix, pid, t))
}
