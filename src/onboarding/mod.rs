//! Provider setup wizard — step machine, validation, inference, and the
//! flow controller that ties them to the persistence layer.

pub mod controller;
pub mod infer;
pub mod model;
pub mod routes;
pub mod rules;
pub mod step;

pub use controller::{FlowController, FlowStatus, UsernameProbe};
pub use model::{FieldPatch, ServiceEntry, SetupRecord};
pub use step::{FlowPhase, SetupStep};
