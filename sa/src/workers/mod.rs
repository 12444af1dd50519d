//! The three application workers
//!
//! | Worker      | Woken by                 | Work                                  |
//! |-------------|--------------------------|---------------------------------------|
//! | calculation | sensor publish           | glide computer, publish derived state |
//! | instrument  | poll timeout only        | vario gauge refresh                   |
//! | render      | derived publish, redraw  | compose and present a frame           |

mod calculation;
mod instrument;
mod render;

pub use calculation::{CalculationJob, CalculationWorker, calculation_worker};
pub use instrument::{InstrumentJob, InstrumentWorker, instrument_worker};
pub use render::{RenderJob, RenderWorker, render_worker};
