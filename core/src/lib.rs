pub mod binding;
pub mod builtins;
pub mod collect;
pub mod error;
pub mod expander;
pub mod lexer;
pub mod replacements;
pub mod resolver;
pub mod scanner;
pub mod source;
pub mod value;

mod evaluator;
mod materialize;

pub use binding::Mode;
pub use collect::CollectedVars;
pub use error::{MacroError, ResolverError, Result};
pub use expander::{Expander, Expansion};
pub use materialize::encode_uri_component;
pub use replacements::{ExpandParams, UrlReplacements, ensure_protocol_matches};
pub use resolver::{Bindings, Resolver, ResolverResult};
pub use source::{Registry, Replacement, VariableSource};
pub use value::Value;
