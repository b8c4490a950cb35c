//! Caching workload definition.
//!
//! - [`ImageSet`]: the ordered images to pre-pull
//! - [`WorkloadBuilder`]: turns an image set into a node-wide DaemonSet
//! - [`ReadinessStatus`]: rollout progress derived from the DaemonSet status

pub mod builder;
pub mod image_set;
pub mod status;

pub use builder::WorkloadBuilder;
pub use image_set::ImageEntry;
pub use image_set::ImageSet;
pub use status::ReadinessStatus;
