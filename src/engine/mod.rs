pub mod context;
pub mod kernel;
pub mod precision;
pub mod resume;
pub mod solid_guess;
pub mod worklist;
pub mod zoom;

pub use context::{CalcStatus, CalculationContext, MathMode};
pub use kernel::{FractalKernel, MandelbrotBigFloat, MandelbrotDouble, PixelOutcome};
pub use resume::{ResumeBuffer, RESUME_VERSION};
pub use solid_guess::SolidGuess;
pub use worklist::{WorkItem, WorkList, MAX_CALC_WORK};
pub use zoom::ZoomBox;

use thiserror::Error;

/// Recoverable scheduler and resume conditions. The numeric core never
/// errors; these cover the bookkeeping layers around it, and callers fall
/// back to immediate evaluation or a full recalculation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("work list already holds {MAX_CALC_WORK} rectangles")]
    WorkListFull,
    #[error("resume buffer exhausted at offset {offset}")]
    ResumeExhausted { offset: usize },
    #[error("no resume buffer to read from")]
    ResumeMissing,
}
