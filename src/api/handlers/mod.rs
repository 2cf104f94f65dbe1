//! One module per resource group, mirroring the teacher's
//! `api/rest/handlers/*.rs` split. Every handler is a thin translation from
//! an axum extractor to a [`crate::pipeline::Pipeline`] call; the pipeline
//! itself owns authorization and persistence.

pub mod audit;
pub mod graph;
pub mod groups;
pub mod identity;
pub mod inventory;
pub mod issues;
pub mod lookup;
pub mod oncall;
pub mod projects;
pub mod tenancy;
