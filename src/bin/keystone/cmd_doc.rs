use anyhow::Result;
use std::path::PathBuf;

use keystone::{DataObjectCache, Subtree};

pub fn exec(manifest: PathBuf, xml: bool) -> Result<i32> {
    let mut doc = DataObjectCache::new();
    doc.import_from_manifest_file(&manifest, Subtree::Persistent)?;
    if xml {
        println!("{}", doc.export_xml_string(Subtree::Persistent)?);
    } else {
        print!("{}", doc.render_tree());
    }
    Ok(0)
}
