//! Builders that assemble controllers from configuration.

pub mod controller_builder;

pub use controller_builder::{
    build_controller, start_all, start_all_with_threadiness, RunnableController,
};
