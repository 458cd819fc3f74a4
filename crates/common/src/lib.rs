pub mod crowd;
pub mod validation;
