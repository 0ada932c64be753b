pub mod big;
pub mod engine;
pub mod renderer;
pub mod util;
