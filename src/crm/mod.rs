//! CRM: leads, quotations and product samples sent ahead of a sale

pub mod lead;
pub mod quotation;
pub mod sample;

pub use lead::*;
pub use quotation::*;
pub use sample::*;
