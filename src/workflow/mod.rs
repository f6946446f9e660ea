pub mod client;
pub mod controller;

pub use client::{download_image, HttpRedesignApi, LocalPipeline, RedesignApi};
pub use controller::{GenerateOutcome, WorkflowController};
