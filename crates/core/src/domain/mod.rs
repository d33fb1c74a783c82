pub mod category;
pub mod claim;
pub mod principal;
