//! The trip synchronization layer.
//!
//! Four cooperating pieces keep a client's cached view of a trip converging
//! on server truth:
//!
//! - [`connection`] — one WebSocket per (trip, user), reconnecting with
//!   linear backoff, emitting typed [`crate::model::ServerEvent`]s.
//! - [`dispatch`] — maps each event kind to the minimal set of cache
//!   invalidations, tracking a processed-offset cursor so nothing is
//!   dispatched twice.
//! - [`mutation`] — optimistic writes: speculative local patch, remote
//!   call, exact-snapshot rollback on failure, refetch either way.
//! - [`view`] — projects the cached collections into one immutable view
//!   model for rendering.
//!
//! [`session::TripSession`] wires them together around a [`store::TripStore`]
//! and an [`api::ApiClient`].

pub mod api;
pub mod connection;
pub mod dispatch;
pub mod mutation;
pub mod session;
pub mod store;
pub mod view;

pub use api::{ApiClient, ApiError};
pub use connection::ConnectionManager;
pub use dispatch::EventDispatcher;
pub use mutation::{Mutation, MutationError, MutationKind, MutationPhase, MutationReceipt};
pub use session::{SessionError, TripSession};
pub use store::{Collection, CollectionSnapshot, TripStore};
pub use view::{build_view, MilestoneView, TripView};
