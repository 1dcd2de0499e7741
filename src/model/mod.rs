//! Record data model
//!
//! Every kind shares the same base shape (identity, ownership, timestamps,
//! geolocation); the `kind` tag selects the body. Kind-specific fields the
//! review flow does not look at are kept as opaque JSON.

mod kind;
mod record;

pub use kind::RecordKind;
pub use record::{Batch, PageMeta, Record, RecordBody, RecordPage, Standalone, SubUnit};
