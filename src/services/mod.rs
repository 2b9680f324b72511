//! Services operating on domain types.

pub mod digester;

pub use digester::AuthenticodeDigester;
