use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use itertools::izip;

use crate::{
    types::Result,
    OptProcess,
    vasp_parsers::procar::{
        Procar,
        NegativeOccupancies,
    },
};


#[derive(Debug, Args)]
/// Print the basic information of PROCAR.
///
/// Including the calculation type, number of k-points, bands and ions, the orbitals
/// projected on, and the list of k-points with their weights.
pub struct Info {
    #[arg(default_value = "./PROCAR")]
    /// Specify the input PROCAR file, gzipped file is also accepted.
    procar: PathBuf,

    #[arg(long, value_enum, default_value_t = NegativeOccupancies::Warn)]
    /// How to deal with negative occupancies.
    negative_occupancies: NegativeOccupancies,
}


impl OptProcess for Info {
    fn process(&self) -> Result<()> {
        let procar = Procar::from_file_with(&self.procar, self.negative_occupancies)?;

        let mut output = String::with_capacity(256);
        output.push_str("--------------------------------------------------------------------------------\n");
        output.push_str(&format!(" Calculation type : {}\n", procar.calculation.to_string().bright_yellow()));
        output.push_str(&format!(" Spin channels    : {:5}\n", procar.spin_channels));
        output.push_str(&format!(" K-points         : {:5}\n", procar.number_of_k_points));
        output.push_str(&format!(" Bands            : {:5}\n", procar.number_of_bands));
        output.push_str(&format!(" Ions             : {:5}\n", procar.number_of_ions));
        output.push_str(&format!(" Orbitals         : {}\n", procar.orbitals.join(" ").bright_cyan()));
        output.push_str("--------------------------------------------------------------------------------\n");
        output.push_str(&format!(" {:>5}  {:>11} {:>11} {:>11}  {:>10}\n", "#k", "kx", "ky", "kz", "weight"));

        for (ik, k, w) in izip!(1 .., procar.k_points.rows(), procar.weights.iter()) {
            output.push_str(&format!(" {:5}  {:11.8} {:11.8} {:11.8}  {:10.8}\n", ik, k[0], k[1], k[2], w));
        }
        output.push_str("--------------------------------------------------------------------------------");

        println!("{}", output);
        Ok(())
    }
}
