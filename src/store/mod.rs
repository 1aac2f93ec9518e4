// SPDX-License-Identifier: MIT

//! Persisted state: checkpoint file and cached remote sessions.

pub mod checkpoint;
pub mod session;

pub use checkpoint::FileCheckpointStore;
pub use session::SessionStore;
