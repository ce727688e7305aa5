//! HTTP surface: the intercepting proxy and its `/__harbor` control plane.

pub mod app;
