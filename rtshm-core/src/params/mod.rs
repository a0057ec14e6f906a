//! Hierarchical configuration-parameter tree.
//!
//! Sections nest like directories and are addressed by `/`-delimited paths;
//! each section holds named parameters, and each parameter holds a list of
//! typed values addressed by index.
//!
//! ```text
//! ""                  /                       section (root)
//!   sec1              /sec1                   section
//!     subsec1         /sec1/subsec1           section
//!       key1          /sec1/subsec1, key1     parameter
//!         [0] = 5                             value
//!         [1] = 7                             value
//!   sec2              /sec2                   section
//!   key5              /, key5                 parameter
//! ```
//!
//! Nodes are created lazily on first access and never deleted. The first
//! typed write to a value claims its kind for good.

mod node;
mod path;
mod snapshot;
mod tree;
mod value;

pub use node::{PARAM_NAME_MAX, ParameterNode, SectionNode, ValueNode};
pub use snapshot::{ParameterSnapshot, SectionSnapshot, TreeSnapshot};
pub use tree::{ParamTree, Values};
pub use value::{Scalar, Slot, Value, ValueKind};

pub(crate) use tree::init_root;
