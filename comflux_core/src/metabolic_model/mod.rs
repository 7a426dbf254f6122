//! Module providing the records for a single organism's metabolic model.

pub mod metabolite;
pub mod model;
pub mod reaction;
