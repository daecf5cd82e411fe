//! Flutter-facing bindings for the Brainrack core.

pub mod api;
