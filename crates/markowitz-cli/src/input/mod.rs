pub mod csv_returns;
pub mod file;
pub mod stdin;
