//! In-process progress stream.
//!
//! Job runners publish [`ProgressEvent`]s through a per-job
//! [`ProgressSender`]; any number of consumers drain the shared
//! [`ProgressChannel`] in FIFO order.

pub mod channel;
pub mod error;

pub use channel::{encode_event, ProgressChannel, ProgressSender};
pub use error::{ProgressError, ProgressResult};

pub use fswap_models::{JobEvent, ProgressEvent};
