//! Core rust implementation of comflux, a crate for constraint based modeling of microbial
//! communities.
//!
//! Member metabolic models are merged into a [`Community`](community::Community) sharing one
//! medium, which is then solved with the cooperative tradeoff
//! ([`Tradeoff`](tradeoff::Tradeoff)): every taxon is guaranteed a fraction of its
//! individual maximal growth rate, community growth is maximized, and the remaining
//! freedom is removed by keeping growth rates as close as possible to those maxima.

pub mod community;
pub mod configuration;
pub mod elasticity;
pub mod io;
pub mod media;
pub mod metabolic_model;
pub mod optimize;
pub mod tradeoff;
mod utils;
