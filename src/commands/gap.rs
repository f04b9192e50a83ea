use std::path::PathBuf;

use clap::Args;
use log::info;
use anyhow::ensure;
use colored::Colorize;

use crate::{
    types::Result,
    OptProcess,
    vasp_parsers::procar::{
        Procar,
        NegativeOccupancies,
    },
};


#[derive(Debug, Args)]
/// Find band gap and print positions of VBM and CBM
pub struct Gap {
    #[arg(long, short = 'p', num_args = 1.., default_value = "./PROCAR")]
    /// PROCAR file name(s), k-points of split PROCARs are joined in the given order
    procar: Vec<PathBuf>,
}


/// Band edges of one eigenvalue channel, indices count from 0.
#[derive(Debug, Clone, PartialEq)]
pub struct BandEdges {
    pub cbidx:  usize,
    pub cbm:    f64,
    pub cbmik:  usize,
    pub vbm:    f64,
    pub vbmik:  usize,
}

impl BandEdges {
    pub fn gap(&self) -> f64 {
        self.cbm - self.vbm
    }

    pub fn is_direct(&self) -> bool {
        self.cbmik == self.vbmik
    }
}


impl Gap {
    /// Locate VBM and CBM of each eigenvalue channel, `None` for metallic systems.
    pub fn find_band_edges(procar: &Procar) -> Result<Option<Vec<BandEdges>>> {
        let eigs = &procar.bands;
        let occs = &procar.occupancy;
        let nspin  = procar.eigen_channels();
        let nkpts  = procar.number_of_k_points;
        let nbands = procar.number_of_bands;

        let threshold: f64 = occs.iter().copied().fold(f64::NAN, f64::max) / 2.0;

        let mut ret = Vec::with_capacity(nspin);
        for ispin in 0 .. nspin {
            // lowest conduction band indices
            let cbidx = (0 .. nkpts)
                .map(|ik| (0 .. nbands).position(|ib| occs[(ispin, ik, ib)] <= threshold).unwrap_or(nbands))
                .collect::<Vec<usize>>();

            let cbi = cbidx[0];
            if cbidx.iter().any(|&x| x != cbi) {
                return Ok(None);
            }
            ensure!(cbi > 0 && cbi < nbands,
                "Cannot locate band edges: {} of {} bands are occupied for spin {}.", cbi, nbands, ispin + 1);

            let (cbmik, cbm) = (0 .. nkpts)
                .map(|ik| (ik, eigs[(ispin, ik, cbi)]))
                .fold((0, f64::INFINITY), |acc, x| if x.1 < acc.1 { x } else { acc });
            let (vbmik, vbm) = (0 .. nkpts)
                .map(|ik| (ik, eigs[(ispin, ik, cbi - 1)]))
                .fold((0, f64::NEG_INFINITY), |acc, x| if x.1 > acc.1 { x } else { acc });

            ret.push(BandEdges { cbidx: cbi, cbm, cbmik, vbm, vbmik });
        }

        Ok(Some(ret))
    }
}


impl OptProcess for Gap {
    fn process(&self) -> Result<()> {
        info!("Trying to parse {:?} ...", self.procar);
        let procar = Procar::from_files(&self.procar, NegativeOccupancies::default())?;

        let edges = match Self::find_band_edges(&procar)? {
            Some(edges) => edges,
            None => {
                let mut output = String::with_capacity(60);
                output.push_str("----------------------------------------\n");
                output.push_str(&format!(" Current system is  {:^20}\n", "Metal".bright_yellow()));
                output.push_str("----------------------------------------");
                println!("{}", output);

                return Ok(());
            },
        };

        let kvec = &procar.k_points;
        let spin_ud = ["SPIN UP", "SPIN DOWN"];

        let mut output = String::with_capacity(60);
        output.push_str("--------------------------------------------------------------------------------\n");
        for (ispin, e) in edges.iter().enumerate() {
            if edges.len() > 1 {
                output.push_str(&format!("    ====================  Gap Info For {:^15}  ====================    \n", spin_ud[ispin].bright_green()));
            }

            let is_direct = if e.is_direct() { "Direct Gap" } else { "Indirect Gap" };
            let kcbm = kvec.row(e.cbmik);
            let kvbm = kvec.row(e.vbmik);

            output.push_str(&format!(" Current system has {:^16} of {:^10} eV\n",
                                     is_direct.bright_yellow(), format!("{:5.3}", e.gap()).bright_cyan()
                                     ));
            output.push_str(&format!("  CBM @ k-point {:5} of ({:6.3},{:6.3},{:6.3}) , band {:5} of {:8} eV\n",
                                     e.cbmik + 1, kcbm[0], kcbm[1], kcbm[2], e.cbidx + 1,
                                     format!("{:8.3}", e.cbm).bright_blue()
                                     ));
            output.push_str(&format!("  VBM @ k-point {:5} of ({:6.3},{:6.3},{:6.3}) , band {:5} of {:8} eV\n",
                                     e.vbmik + 1, kvbm[0], kvbm[1], kvbm[2], e.cbidx,
                                     format!("{:8.3}", e.vbm).bright_blue()
                                     ));
        }
        output.push_str("--------------------------------------------------------------------------------");

        println!("{}", output);
        Ok(())
    }
}
