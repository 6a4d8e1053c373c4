//! `triage-worker` library: the Postgres-backed `Store` implementation,
//! the concrete external collaborators, and the claim-dispatch-complete
//! loop. Split out from the binary (mirroring the teacher's `server`
//! package's bin+lib split) so integration tests can reach these types
//! directly instead of re-exercising everything through the CLI.

pub mod config;
pub mod external;
pub mod store;
pub mod worker;
