#![deny(missing_docs)]
#![doc = "Shared types for Monte Carlo data valuation: mergeable running estimates, the three-valued status algebra, utilities, errors and seeded RNG streams."]

pub mod errors;
pub mod logging;
pub mod numeric;
pub mod report;
pub mod result;
pub mod rng;
pub mod status;
pub mod utility;

pub use errors::{DvalError, ErrorInfo};
pub use report::{ValueRow, ValueTable};
pub use result::{
    Iter, ResultExtension, SortKey, ValuationResult, ValuationResultBuilder, ValueItem,
};
pub use rng::{derive_substream_seed, RngHandle};
pub use status::Status;
pub use utility::{FnUtility, Utility};
