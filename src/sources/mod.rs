// Built-in source adapters, one module per data source
pub mod aa;
pub mod aeroplan;

pub use aa::AaAdapter;
pub use aeroplan::AeroplanAdapter;
