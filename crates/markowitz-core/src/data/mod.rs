pub mod cleaning;
pub mod returns;
