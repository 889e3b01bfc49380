pub mod analytics;
pub mod core;
pub mod jadwal;
pub mod jurnal;
pub mod master;
pub mod reports;
pub mod setup;
