pub mod types;
pub mod vasp_parsers;
pub mod effmass;
pub mod commands;
pub mod cli;

pub use types::Result;
pub use cli::OptProcess;

pub use vasp_parsers::procar::{
    Procar,
    CalculationType,
    NegativeOccupancies,
};

pub use effmass::{
    area_of_a_triangle_in_cartesian_space,
    points_are_in_a_straight_line,
    least_squares_effective_mass,
    two_point_effective_mass,
};
