//! Programmer-error taxonomy for `meta-core` (spec.md §7(e)).
//!
//! Store mutations (`add`/`update`/`delete`/`reset`) never return a
//! `Result` — a missing UID is a no-op, not a failure. `CoreError` only
//! covers the handful of call sites where a caller can pass something the
//! store must refuse outright: a malformed resource, or a double exporter
//! registration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("resource is missing a UID and cannot be stored")]
    MalformedResource,

    #[error("exporter is already registered on this store")]
    DuplicateExporter,
}
