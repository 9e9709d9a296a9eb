pub mod atlas;
pub mod block;
pub mod chunk;
pub mod debug;
pub mod horizon;
pub mod ron;
pub use crate::ron as ron_loader;
pub mod runtime;
pub mod settings;
pub mod terrain;
pub mod world;

pub use runtime::{PrewarmState, VoxelWorldPlugin};
