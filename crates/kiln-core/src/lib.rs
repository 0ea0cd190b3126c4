pub mod binary;
pub mod builder;
pub mod compat;
pub mod config;
pub mod error;
pub mod exit;
pub mod graph;
pub mod hooks;
pub mod identity;
pub mod index;
pub mod paths;
pub mod policy;
pub mod profile;
pub mod recipe;
pub mod report;
pub mod resolver;
pub mod store;
pub mod validate;

pub mod reporter;

pub use builder::{GraphBuilder, RootSpec};
pub use config::{ConfigError, KilnConfig};
pub use error::{GraphError, ResolveError};
pub use exit::ExitStatus;
pub use graph::{CompatibilityFallback, Graph, InvalidReason, Node, NodeId, NodeKind};
pub use hooks::{CompatibilityCandidate, HookContext, HookError, HookKind};
pub use index::{RecipeIndex, RecipeSource};
pub use paths::*;
pub use policy::BuildPolicy;
pub use profile::Profile;
pub use recipe::{Recipe, RecipeError};
pub use report::{GraphReport, NodeReport};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{Outcome, ResolveRequest, Resolution, Resolver};
pub use store::{BinaryHandle, BinaryKey, BinaryStore, BinaryStores, MemoryStore, StoreError};
