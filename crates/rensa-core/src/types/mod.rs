pub mod mode;
pub mod neuron;
pub mod state;
pub mod tagset;

pub use mode::{ModelDirection, ModelType, RunningMode, Traversal};
pub use neuron::Neuron;
pub use state::{RuntimeFeature, Sequence, State};
pub use tagset::TagSet;
