//! Generic steps that can be named straight from a manifest.
//!
//! | impl_ref           | kwargs / args                                   |
//! |--------------------|-------------------------------------------------|
//! | `noop`             | optional `estimate` (seconds)                   |
//! | `sleep`            | `seconds` (f64), polls the cancel token         |
//! | `shell`            | args = argv, optional `cwd` (relative to data)  |
//! | `set-property`     | `name`, `value`, optional `subtree`             |
//! | `require-property` | `name`, optional `value`, optional `subtree`    |
//! | `fail`             | optional `message`                              |

use anyhow::{bail, Context, Result};
use std::process::Command;
use std::time::Duration;

use crate::doc::objects::Property;
use crate::doc::{Query, Subtree};
use crate::error::CheckpointError;

use super::cancel::run_command_checked;
use super::factory::{CheckpointArgs, FactoryTable};
use super::{Checkpoint, ExecContext, DEFAULT_PROGRESS_ESTIMATE_SECS};

pub fn register_builtin(t: &mut FactoryTable) {
    t.register("noop", |a: &CheckpointArgs| Ok(Box::new(Noop::from_args(a)?) as Box<dyn Checkpoint>));
    t.register("sleep", |a: &CheckpointArgs| Ok(Box::new(Sleep::from_args(a)?) as Box<dyn Checkpoint>));
    t.register("shell", |a: &CheckpointArgs| Ok(Box::new(Shell::from_args(a)?) as Box<dyn Checkpoint>));
    t.register("set-property", |a: &CheckpointArgs| {
        Ok(Box::new(SetProperty::from_args(a)?) as Box<dyn Checkpoint>)
    });
    t.register("require-property", |a: &CheckpointArgs| {
        Ok(Box::new(RequireProperty::from_args(a)?) as Box<dyn Checkpoint>)
    });
    t.register("fail", |a: &CheckpointArgs| Ok(Box::new(Fail::from_args(a)) as Box<dyn Checkpoint>));
}

// ----- noop -----

pub struct Noop {
    estimate: u64,
}

impl Noop {
    fn from_args(a: &CheckpointArgs) -> Result<Self> {
        Ok(Self {
            estimate: a.parse_kwarg("estimate", DEFAULT_PROGRESS_ESTIMATE_SECS)?,
        })
    }
}

impl Checkpoint for Noop {
    fn execute(&mut self, ctx: &mut ExecContext<'_>, _dry_run: bool) -> Result<(), CheckpointError> {
        ctx.log.debug("nothing to do");
        Ok(())
    }

    fn get_progress_estimate(&self) -> u64 {
        self.estimate
    }
}

// ----- sleep -----

pub struct Sleep {
    duration: Duration,
}

impl Sleep {
    fn from_args(a: &CheckpointArgs) -> Result<Self> {
        let secs: f64 = a.parse_kwarg("seconds", 1.0)?;
        if !secs.is_finite() || secs < 0.0 {
            bail!("seconds must be a non-negative number, got {}", secs);
        }
        Ok(Self {
            duration: Duration::from_secs_f64(secs),
        })
    }
}

impl Checkpoint for Sleep {
    fn execute(&mut self, ctx: &mut ExecContext<'_>, dry_run: bool) -> Result<(), CheckpointError> {
        if dry_run {
            return Ok(());
        }
        ctx.log.info(format_args!("sleeping {:?}", self.duration));
        ctx.cancel.sleep(self.duration)
    }

    fn get_progress_estimate(&self) -> u64 {
        self.duration.as_secs().max(1)
    }
}

// ----- shell -----

pub struct Shell {
    argv: Vec<String>,
    cwd: Option<String>,
}

impl Shell {
    fn from_args(a: &CheckpointArgs) -> Result<Self> {
        if a.args.is_empty() {
            bail!("shell needs at least one <arg> (the program)");
        }
        Ok(Self {
            argv: a.args.clone(),
            cwd: a.kwarg("cwd").map(str::to_string),
        })
    }
}

impl Checkpoint for Shell {
    fn execute(&mut self, ctx: &mut ExecContext<'_>, dry_run: bool) -> Result<(), CheckpointError> {
        let program = &self.argv[0];
        if dry_run {
            ctx.log.info(format_args!("would run {:?}", self.argv));
            return Ok(());
        }
        let mut cmd = Command::new(program);
        cmd.args(&self.argv[1..]);
        match (&self.cwd, ctx.dataset) {
            (Some(rel), Some(data)) => {
                cmd.current_dir(data.join(rel));
            }
            (Some(dir), None) => {
                cmd.current_dir(dir);
            }
            (None, Some(data)) => {
                cmd.current_dir(data);
            }
            (None, None) => {}
        }
        if let Some(data) = ctx.dataset {
            cmd.env("KEYSTONE_DATASET", data);
        }
        cmd.env("KEYSTONE_CHECKPOINT", ctx.name);
        ctx.log.info(format_args!("running {:?}", self.argv));
        run_command_checked(&mut cmd, &ctx.cancel, ctx.cancel_grace)
    }
}

// ----- set-property -----

pub struct SetProperty {
    name: String,
    value: String,
    subtree: Subtree,
}

impl SetProperty {
    fn from_args(a: &CheckpointArgs) -> Result<Self> {
        Ok(Self {
            name: a.require_kwarg("name")?.to_string(),
            value: a.kwarg("value").unwrap_or_default().to_string(),
            subtree: a.parse_kwarg("subtree", Subtree::Persistent)?,
        })
    }
}

impl Checkpoint for SetProperty {
    fn execute(&mut self, ctx: &mut ExecContext<'_>, dry_run: bool) -> Result<(), CheckpointError> {
        if dry_run {
            return Ok(());
        }
        let root = ctx.doc.root(self.subtree);
        let q = Query::new()
            .named(self.name.as_str())
            .of_type::<Property>()
            .not_found_is_err(false);
        let old = ctx.doc.delete_children(root, &q).context("remove previous value")?;
        for id in old {
            ctx.doc.tree_mut().purge(id).context("free previous value")?;
        }
        let id = ctx
            .doc
            .tree_mut()
            .new_node(self.name.as_str(), Property::new(self.value.as_str()));
        ctx.doc
            .insert_children(root, &[id], None)
            .context("insert property")?;
        ctx.log.debug(format_args!("{}/{} = {}", self.subtree, self.name, self.value));
        Ok(())
    }
}

// ----- require-property -----

pub struct RequireProperty {
    name: String,
    value: Option<String>,
    subtree: Subtree,
}

impl RequireProperty {
    fn from_args(a: &CheckpointArgs) -> Result<Self> {
        Ok(Self {
            name: a.require_kwarg("name")?.to_string(),
            value: a.kwarg("value").map(str::to_string),
            subtree: a.parse_kwarg("subtree", Subtree::Persistent)?,
        })
    }
}

impl Checkpoint for RequireProperty {
    // Runs in dry mode too: it only reads the DOC.
    fn execute(&mut self, ctx: &mut ExecContext<'_>, _dry_run: bool) -> Result<(), CheckpointError> {
        let root = ctx.doc.root(self.subtree);
        let q = Query::new().named(self.name.as_str()).of_type::<Property>();
        let found = ctx
            .doc
            .get_descendants(root, &q)
            .with_context(|| format!("property '{}' not set in {}", self.name, self.subtree))?;
        let tree = ctx.doc.tree();
        let actual = found
            .first()
            .and_then(|&id| tree.get::<Property>(id))
            .map(|p| p.value.clone())
            .unwrap_or_default();
        match &self.value {
            Some(want) if *want != actual => Err(CheckpointError::failed(format!(
                "property '{}' is '{}', expected '{}'",
                self.name, actual, want
            ))),
            _ => Ok(()),
        }
    }
}

// ----- fail -----

pub struct Fail {
    message: String,
}

impl Fail {
    fn from_args(a: &CheckpointArgs) -> Self {
        Self {
            message: a.kwarg("message").unwrap_or("checkpoint failed").to_string(),
        }
    }
}

impl Checkpoint for Fail {
    fn execute(&mut self, _ctx: &mut ExecContext<'_>, _dry_run: bool) -> Result<(), CheckpointError> {
        Err(CheckpointError::failed(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CancelToken, CheckpointLogger};
    use crate::doc::DataObjectCache;
    use log::LevelFilter;

    fn run(
        t: &FactoryTable,
        impl_ref: &str,
        a: &CheckpointArgs,
        doc: &mut DataObjectCache,
        dry_run: bool,
    ) -> Result<(), CheckpointError> {
        let f = t.resolve(impl_ref).unwrap();
        let mut cp = f(a)?;
        let mut ctx = ExecContext {
            name: impl_ref,
            doc,
            cancel: CancelToken::new(),
            log: CheckpointLogger::new(impl_ref, LevelFilter::Off),
            dataset: None,
            cancel_grace: Duration::from_millis(100),
        };
        cp.execute(&mut ctx, dry_run)
    }

    fn kw(pairs: &[(&str, &str)]) -> CheckpointArgs {
        let mut a = CheckpointArgs::new();
        for (k, v) in pairs {
            a.kwargs.insert(k.to_string(), v.to_string());
        }
        a
    }

    #[test]
    fn property_handoff_between_steps() {
        let t = FactoryTable::with_builtin();
        let mut doc = DataObjectCache::new();

        let req = kw(&[("name", "stage"), ("value", "two")]);
        assert!(run(&t, "require-property", &req, &mut doc, false).is_err());

        run(&t, "set-property", &kw(&[("name", "stage"), ("value", "one")]), &mut doc, false).unwrap();
        run(&t, "set-property", &kw(&[("name", "stage"), ("value", "two")]), &mut doc, false).unwrap();
        let p = doc.persistent();
        assert_eq!(doc.tree().children(p).unwrap().len(), 1);
        run(&t, "require-property", &req, &mut doc, false).unwrap();
    }

    #[test]
    fn set_property_is_skipped_in_dry_run() {
        let t = FactoryTable::with_builtin();
        let mut doc = DataObjectCache::new();
        let a = kw(&[("name", "x"), ("value", "1"), ("subtree", "volatile")]);
        run(&t, "set-property", &a, &mut doc, true).unwrap();
        assert!(doc.tree().children(doc.volatile()).unwrap().is_empty());
        run(&t, "set-property", &a, &mut doc, false).unwrap();
        assert_eq!(doc.tree().children(doc.volatile()).unwrap().len(), 1);
    }

    #[test]
    fn bad_arguments_fail_at_construction() {
        let t = FactoryTable::with_builtin();
        let mut doc = DataObjectCache::new();
        assert!(run(&t, "shell", &CheckpointArgs::new(), &mut doc, false).is_err());
        assert!(run(&t, "sleep", &kw(&[("seconds", "-1")]), &mut doc, false).is_err());
        assert!(run(&t, "set-property", &kw(&[("name", "a"), ("subtree", "nowhere")]), &mut doc, false).is_err());
    }

    #[test]
    fn fail_carries_message() {
        let t = FactoryTable::with_builtin();
        let mut doc = DataObjectCache::new();
        let err = run(&t, "fail", &kw(&[("message", "disk full")]), &mut doc, false).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[cfg(unix)]
    #[test]
    fn shell_runs_argv() {
        let t = FactoryTable::with_builtin();
        let mut doc = DataObjectCache::new();
        let mut a = CheckpointArgs::new();
        a.args = vec!["sh".into(), "-c".into(), "exit 3".into()];
        assert!(run(&t, "shell", &a, &mut doc, false).is_err());
        assert!(run(&t, "shell", &a, &mut doc, true).is_ok());
        a.args = vec!["true".into()];
        assert!(run(&t, "shell", &a, &mut doc, false).is_ok());
    }
}
