mod activation;
mod chomp;
pub mod crn;
pub mod decoder;
pub mod encoder;
mod pad;
pub mod recurrent;
pub mod skip;
pub mod stage;
pub mod weights;

pub use chomp::{Chomp, ChompConfig};
