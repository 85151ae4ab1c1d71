use anyhow::Result;
use std::path::PathBuf;

use keystone::lock::{try_lock_run, LockMode};

use crate::util::open_engine;

pub fn exec(path: PathBuf, manifest: PathBuf, json: bool) -> Result<i32> {
    let _lock = try_lock_run(&path, LockMode::Shared)?;
    let engine = open_engine(&path, &manifest, None, false)?;
    let names = engine.get_resumable_checkpoints();
    if json {
        println!("{}", serde_json::to_string(&names)?);
    } else if names.is_empty() {
        println!("(nothing to resume)");
    } else {
        for n in names {
            println!("{}", n);
        }
    }
    Ok(0)
}
