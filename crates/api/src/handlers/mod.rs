pub mod annotation;
pub mod assignment;
pub mod maintenance;
pub mod worker;
