//! Orchestration layer of the geofed engine.
//!
//! Two coordinators live here: the [`ServiceGraph`], which registers named
//! services with declared dependencies and drives ordered start/stop, and
//! the [`DataService`], which federates queries and routes mutations across
//! the registered data stores.

#![forbid(unsafe_code)]

mod data;
mod graph;

pub use data::DataService;
pub use graph::{GraphError, ServiceGraph};
