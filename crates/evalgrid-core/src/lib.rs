#![deny(missing_docs)]
#![doc = "Error taxonomy, data model and hashing helpers shared by the evalgrid crates."]

pub mod errors;
pub mod hash;
mod types;

pub use errors::{io_error, ErrorInfo, EvalError, EvalResult};
pub use hash::{
    canonical_value_string, digest_parts, stable_hash_string, to_canonical_json_bytes,
};
pub use types::{AlgorithmVariant, Attributes, DataCondition, GroupKey, ResultRow};
