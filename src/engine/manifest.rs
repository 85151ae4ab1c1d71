//! Registration driven by the DOC: every `<checkpoint>` under an
//! `<execution>` element becomes a registered descriptor, in document order.

use std::path::Path;

use anyhow::Context;

use crate::doc::objects::{CheckpointSpec, Execution};
use crate::doc::{NodeId, Query, Subtree};
use crate::error::{EngineError, EngineResult};
use crate::util::parse_level;

use super::descriptor::CheckpointRequest;
use super::Engine;

impl Engine {
    /// Register the checkpoints of every `Execution` object in the DOC
    /// (persistent subtree first, then volatile). The first `Execution`
    /// found also sets `stop_on_error`. Returns the number registered.
    /// All or nothing: on error the registry and `stop_on_error` are left
    /// as they were.
    pub fn register_from_doc(&mut self) -> EngineResult<usize> {
        let saved = (self.checkpoints.clone(), self.stop_on_error);
        let res = self.register_from_doc_inner();
        if res.is_err() {
            (self.checkpoints, self.stop_on_error) = saved;
        }
        res
    }

    fn register_from_doc_inner(&mut self) -> EngineResult<usize> {
        let executions = self.find_executions();
        if executions.is_empty() {
            return Err(EngineError::Manifest("no <execution> element in the DOC".into()));
        }

        let mut requests = Vec::new();
        for (i, &ex) in executions.iter().enumerate() {
            let tree = self.doc.tree();
            if i == 0 {
                if let Some(e) = tree.get::<Execution>(ex) {
                    self.stop_on_error = e.stop_on_error;
                }
            }
            let q = Query::new().of_type::<CheckpointSpec>().not_found_is_err(false);
            for id in self.doc.get_children(ex, &q)? {
                let name = tree.name(id)?.to_string();
                let Some(spec) = tree.get::<CheckpointSpec>(id) else {
                    continue;
                };
                requests.push(request_from_spec(&name, spec)?);
            }
        }

        let n = requests.len();
        for req in requests {
            self.register_checkpoint(req)?;
        }
        log::info!(
            "registered {} checkpoint(s) from manifest (stop_on_error={})",
            n,
            self.stop_on_error
        );
        Ok(n)
    }

    /// Import a manifest file into the persistent subtree and register its
    /// checkpoints.
    pub fn load_manifest(&mut self, path: &Path) -> anyhow::Result<usize> {
        self.doc
            .import_from_manifest_file(path, Subtree::Persistent)?;
        let n = self
            .register_from_doc()
            .with_context(|| format!("register checkpoints from {}", path.display()))?;
        Ok(n)
    }

    fn find_executions(&self) -> Vec<NodeId> {
        let q = Query::new().of_type::<Execution>().not_found_is_err(false);
        let mut out = Vec::new();
        for root in [self.doc.persistent(), self.doc.volatile()] {
            if let Ok(found) = self.doc.get_descendants(root, &q) {
                out.extend(found);
            }
        }
        out
    }
}

fn request_from_spec(name: &str, spec: &CheckpointSpec) -> EngineResult<CheckpointRequest> {
    let mut req = CheckpointRequest::new(name, spec.mod_path.as_str()).boundary(spec.boundary);
    if let Some(l) = &spec.loglevel {
        let level = parse_level(l).ok_or_else(|| {
            EngineError::Manifest(format!("checkpoint '{}': bad loglevel '{}'", name, l))
        })?;
        req = req.loglevel(level);
    }
    if let Some(d) = &spec.description {
        req = req.description(d.as_str());
    }
    for a in &spec.args {
        req = req.arg(a.as_str());
    }
    for (k, v) in &spec.kwargs {
        req = req.kwarg(k.as_str(), v.as_str());
    }
    Ok(req)
}
