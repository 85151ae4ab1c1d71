// Data object cache: arena tree, queries, XML dispatch
pub mod doc; // src/doc/{mod,object,tree,query,xml,registry,objects,cache}.rs

// Units of work and the engine that runs them
pub mod checkpoint; // src/checkpoint/{mod,cancel,factory,builtin}.rs
pub mod engine; // src/engine/{mod,state,descriptor,execute,manifest}.rs
pub mod errsvc;

// Rollback providers
pub mod snapshots; // src/snapshots/{mod,memory,dir,registry}.rs

// Ambient
pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod util; // src/util/mod.rs

pub use checkpoint::{
    CancelToken, Checkpoint, CheckpointArgs, CheckpointLogger, ExecContext, FactoryTable,
};
pub use config::EngineConfig;
pub use doc::{DataObject, DataObjectCache, NodeId, Query, Subtree};
pub use engine::{
    CheckpointDescriptor, CheckpointRequest, Engine, EngineBuilder, EngineState, ExecStatus,
    Progress,
};
pub use error::{CheckpointError, EngineError, EngineResult, ParsingError, TreeError, XmlError};
pub use errsvc::{ErrorKind, ErrorRecord, ErrorService};
pub use snapshots::{DirSnapshots, MemorySnapshots, SnapshotPolicy, SnapshotProvider};
