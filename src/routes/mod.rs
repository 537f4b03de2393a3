use axum::Router;

use crate::state::SharedState;

pub mod health;
pub mod public;
pub mod sse;

/// Compose all route trees and wire in the shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(public::router())
        .merge(sse::router())
        .with_state(state)
}
