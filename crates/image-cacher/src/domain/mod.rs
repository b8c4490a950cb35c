pub mod caching;
pub mod workload;
