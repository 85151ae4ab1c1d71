use anyhow::Result;
use std::path::PathBuf;

use keystone::{Engine, EngineConfig, MemorySnapshots};

pub fn exec(manifest: PathBuf, json: bool) -> Result<i32> {
    let mut engine = Engine::builder()
        .config(EngineConfig::from_env())
        .snapshots(MemorySnapshots::without_dataset())
        .build();
    engine.load_manifest(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(engine.checkpoints())?);
        return Ok(0);
    }
    println!("stop_on_error: {}", engine.stop_on_error());
    for (i, d) in engine.checkpoints().iter().enumerate() {
        print!("{:>3}. {} [{}]", i + 1, d.name, d.impl_ref);
        if d.boundary {
            print!(" boundary");
        }
        if let Some(desc) = &d.description {
            print!(" - {}", desc);
        }
        println!();
    }
    Ok(0)
}
