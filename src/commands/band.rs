use std::path::PathBuf;

use clap::Args;
use log::info;

use crate::{
    types::{
        Result,
        Vector,
    },
    OptProcess,
    vasp_parsers::procar::{
        Procar,
        NegativeOccupancies,
    },
    commands::common::{
        write_array_to_txt,
        parse_iions,
        parse_iorbitals,
    },
};


#[derive(Debug, Args)]
/// Write the band structure in PROCAR as plain text.
///
/// The first column is the accumulated k-path length in fractional units, followed by one
/// column per band. Spin up bands go before spin down ones for ISPIN = 2 systems.
///
/// With `--ions` or `--orbitals` specified, the projections summed over the selection are
/// written to another file in the same layout, which can be used to draw fat bands.
pub struct Band {
    #[arg(short, long, num_args = 1.., default_value = "./PROCAR")]
    /// PROCAR file name(s), gzipped file is also accepted. K-points of split PROCARs are
    /// joined in the given order.
    procar: Vec<PathBuf>,

    #[arg(short = 'o', long, default_value = "band_raw.txt")]
    /// Output text file name.
    txtout: PathBuf,

    #[arg(long)]
    /// Selected ions for projection weights, counting from 1.
    ///
    /// Ranges and negative indices are accepted, e.g. "1 3..5 -1". All the ions are selected
    /// if left blank while `--orbitals` is given.
    ions: Option<String>,

    #[arg(long)]
    /// Selected orbitals for projection weights, by names in PROCAR, e.g. "s px py pz".
    ///
    /// All the orbitals except `tot` are selected if left blank while `--ions` is given.
    orbitals: Option<String>,

    #[arg(long, default_value = "band_weights.txt")]
    /// Output text file name of the projection weights.
    weightout: PathBuf,
}


fn band_label(procar: &Procar, ispin: usize, iband: usize) -> String {
    let spin_labels = ["up", "dn"];
    if procar.is_spin_polarised() {
        format!("band{}_{}", iband + 1, spin_labels[ispin])
    } else {
        format!("band{}", iband + 1)
    }
}


impl Band {
    /// Columns to write: x axis, then each band of each eigenvalue channel.
    pub fn band_columns(procar: &Procar) -> (Vec<Vector<f64>>, String) {
        let mut columns = vec![procar.x_axis(None)];
        let mut labels  = vec!["kpath".to_string()];

        for ispin in 0 .. procar.eigen_channels() {
            for iband in 0 .. procar.number_of_bands {
                columns.push(procar.bands.slice(ndarray::s![ispin, .., iband]).to_owned());
                labels.push(band_label(procar, ispin, iband));
            }
        }

        (columns, labels.join(" "))
    }

    /// Same layout as `band_columns`, with projection weights of the selected ions and
    /// orbitals in place of eigenvalues.
    pub fn weight_columns(procar: &Procar, ions: Option<&str>, orbitals: Option<&str>) -> Result<(Vec<Vector<f64>>, String)> {
        let iions     = parse_iions(ions, procar.number_of_ions)?;
        let iorbitals = parse_iorbitals(orbitals, &procar.orbitals)?;
        info!("Projection weights of ions {:?} on orbitals {:?}",
              iions.iter().map(|i| i + 1).collect::<Vec<_>>(),
              iorbitals.iter().map(|&i| procar.orbitals[i].as_str()).collect::<Vec<_>>());

        let weights = procar.projection_weights(&iions, &iorbitals)?;

        let mut columns = vec![procar.x_axis(None)];
        let mut labels  = vec!["kpath".to_string()];

        for ispin in 0 .. procar.eigen_channels() {
            for iband in 0 .. procar.number_of_bands {
                columns.push(weights.slice(ndarray::s![ispin, .., iband]).to_owned());
                labels.push(band_label(procar, ispin, iband));
            }
        }

        Ok((columns, labels.join(" ")))
    }
}


impl OptProcess for Band {
    fn process(&self) -> Result<()> {
        let procar = Procar::from_files(&self.procar, NegativeOccupancies::default())?;
        let (columns, comment) = Self::band_columns(&procar);

        info!("Writing band structure to {:?}", self.txtout);
        write_array_to_txt(&self.txtout, &columns.iter().collect::<Vec<_>>(), &comment)?;

        if self.ions.is_some() || self.orbitals.is_some() {
            let (columns, comment) = Self::weight_columns(&procar, self.ions.as_deref(), self.orbitals.as_deref())?;
            info!("Writing projection weights to {:?}", self.weightout);
            write_array_to_txt(&self.weightout, &columns.iter().collect::<Vec<_>>(), &comment)?;
        }

        Ok(())
    }
}
