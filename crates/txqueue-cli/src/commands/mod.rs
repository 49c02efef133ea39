pub mod soak;
pub mod walkthrough;
