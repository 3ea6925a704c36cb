pub mod diff;
pub mod error;
pub mod model;
pub mod schema;
pub mod select;
pub mod steps;
pub mod tree;
pub mod validator;
pub mod value;

pub use diff::{diff, DiffEntry, LeafPath, SequencerPath, Snapshot};
pub use error::ValidationError;
pub use model::{RootConfig, SequencerConfig};
pub use tree::{ControlPath, ControlTree};
pub use value::{ControlValue, LayerId, PartIndex, StepIndex};
