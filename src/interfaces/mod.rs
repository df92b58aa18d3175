//! Outer surfaces: the CSV command script, the JSON seed and the invoice
//! report the binary prints.

pub mod csv;
pub mod dispatcher;
pub mod seed;
