pub mod boxedarray;
pub mod macros;
pub mod num;
pub mod timeutils;
