pub mod postgres;
pub mod status;
