//! Sediment-basin model: rivers pivoting about fixed hinges wander by an
//! angle-bounded random walk, deposit at the shoreline of a gridded cube of
//! sediment columns, merge and split, and the columns compact under load.

pub mod angle;
pub mod avulsion;
pub mod bathymetry;
pub mod branching;
pub mod cell;
pub mod column;
pub mod compaction;
pub mod config;
pub mod cube;
pub mod deposit;
pub mod error;
pub mod hydro;
pub mod output;
pub mod river;
pub mod sediment;
pub mod simulation;

pub use bathymetry::Bathymetry;
pub use cell::{Facies, SedimentCell};
pub use column::SedimentColumn;
pub use config::{KeyFile, RiverConfig, SimulationConfig};
pub use cube::SedimentCube;
pub use deposit::DepositionPolicy;
pub use error::BasinError;
pub use river::{River, RiverId};
pub use sediment::SedimentTable;
pub use simulation::{RunControl, Simulation, TickReport};
