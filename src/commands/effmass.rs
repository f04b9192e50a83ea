use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use clap::Args;
use anyhow::{
    anyhow,
    ensure,
    Context,
};
use colored::Colorize;
use figment::{
    Figment,
    providers::{
        Format,
        Serialized,
        Toml,
    },
};
use log::{
    info,
    warn,
};
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    types::{
        Mat33,
        Result,
    },
    OptProcess,
    vasp_parsers::procar::{
        Procar,
        NegativeOccupancies,
    },
    commands::common::parse_indices,
};


const TEMPLATE_HEADER: &str = "\
# Configuration of `rsprocar effmass`, all the indices count from 1.
#
# kpoints: k-points along one straight line, e.g. \"1..5\" or \"1 3 5\", negative
#          indices count from the tail.
# iband: band index.
# ispin: spin channel, 1 or 2 for ISPIN = 2 systems, otherwise 1.
# reciprocal_lattice: rows are reciprocal lattice vectors in 1/Angstrom, k-points are
#          taken in fractional coordinates if omitted.
# negative_occupancies: one of \"warn\", \"raise\", \"ignore\" and \"zero\".

";


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffmassConfig {
    pub procar:               PathBuf,
    pub kpoints:              Option<String>,
    pub iband:                Option<usize>,
    pub ispin:                usize,
    pub reciprocal_lattice:   Option<Mat33<f64>>,
    pub negative_occupancies: NegativeOccupancies,
}

impl EffmassConfig {
    fn template() -> Self {
        Self {
            procar:               PathBuf::from("./PROCAR"),
            kpoints:              Some("1..5".to_string()),
            iband:                Some(1),
            ispin:                1,
            reciprocal_lattice:   Some([[1.0, 0.0, 0.0],
                                        [0.0, 1.0, 0.0],
                                        [0.0, 0.0, 1.0]]),
            negative_occupancies: NegativeOccupancies::Warn,
        }
    }
}


#[derive(Debug, Args)]
/// Calculate effective mass of one band along a straight line in k-space.
///
/// The eigenvalues along the selected k-points are fitted to a parabola by least squares.
/// With exactly two k-points, the first one is taken as band extremum.
///
/// Settings in the configuration file override those from command line.
pub struct Effmass {
    #[arg(short, long, default_value = "./PROCAR")]
    /// PROCAR file name, gzipped file is also accepted.
    procar: PathBuf,

    #[arg(short, long)]
    /// Configuration file in TOML format.
    config: Option<PathBuf>,

    #[arg(long)]
    /// Generate a configuration template `effmass.toml` and exit.
    gen_template: bool,

    #[arg(short, long)]
    /// Selected k-points along one line, counting from 1.
    ///
    /// Example: -k "1..5" or -k "3 2 1"
    kpoints: Option<String>,

    #[arg(short = 'b', long)]
    /// Selected band index, counting from 1.
    iband: Option<usize>,

    #[arg(short = 's', long, default_value_t = 1)]
    /// Selected spin channel, counting from 1.
    ispin: usize,

    #[arg(long, value_enum, default_value_t = NegativeOccupancies::Warn)]
    /// How to deal with negative occupancies.
    negative_occupancies: NegativeOccupancies,
}


impl Effmass {
    pub fn gen_template(path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(&EffmassConfig::template())?;
        fs::write(path, format!("{}{}", TEMPLATE_HEADER, body))
            .with_context(|| format!("Failed to write template to {:?}", path))?;
        Ok(())
    }

    fn to_config(&self) -> EffmassConfig {
        EffmassConfig {
            procar:               self.procar.clone(),
            kpoints:              self.kpoints.clone(),
            iband:                self.iband,
            ispin:                self.ispin,
            reciprocal_lattice:   None,
            negative_occupancies: self.negative_occupancies,
        }
    }

    pub fn load_config(&self) -> Result<EffmassConfig> {
        let mut figment = Figment::from(Serialized::defaults(self.to_config()));
        if let Some(path) = self.config.as_ref() {
            ensure!(path.is_file(), "Configuration file {:?} not found.", path);
            info!("Reading configuration from {:?}", path);
            figment = figment.merge(Toml::file(path));
        }
        figment.extract()
            .map_err(|e| anyhow!("Failed to load effmass configuration: {}", e))
    }
}


impl OptProcess for Effmass {
    fn process(&self) -> Result<()> {
        if self.gen_template {
            let path = PathBuf::from("effmass.toml");
            info!("Writing configuration template to {:?}", path);
            return Self::gen_template(&path);
        }

        let cfg = self.load_config()?;
        let procar = Procar::from_file_with(&cfg.procar, cfg.negative_occupancies)?;

        let kpoints = parse_indices(
            cfg.kpoints.as_deref().context("No k-points selected, please specify `kpoints`.")?,
            procar.number_of_k_points, "k-point")?;
        let iband = cfg.iband.context("No band selected, please specify `iband`.")?;
        if cfg.reciprocal_lattice.is_none() {
            warn!("No reciprocal lattice specified, k-points are taken in fractional coordinates.");
        }

        let mass = procar.effective_mass_calc(&kpoints, iband, cfg.ispin, cfg.reciprocal_lattice.as_ref())?;

        println!(" Effective mass of band {} (spin {}) along k-points {:?}: {} m_e",
                 iband, cfg.ispin, kpoints, format!("{:.6}", mass).bright_cyan());
        Ok(())
    }
}
