use std::{
    fmt,
    path::Path,
    sync::OnceLock,
};

use anyhow::{
    bail,
    ensure,
    Context,
};
use clap::ValueEnum;
use log::{
    debug,
    info,
    warn,
};
use ndarray::{
    concatenate,
    s,
    Array1,
    Array2,
    Array3,
    Array5,
    Axis,
};
use regex::Regex;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    effmass::{
        least_squares_effective_mass,
        two_point_effective_mass,
    },
    types::{
        Cube,
        Mat33,
        MatX3,
        Matrix,
        Result,
        Vector,
    },
    vasp_parsers::read_txt,
};


const NUMBER: &str = r"[-+]?\d+(?:\.\d*)?(?:[eE][-+]?\d+)?";


fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NUMBER).unwrap())
}

fn k_point_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"k-point\s+\d+\s*:(.*?)weight\s*=\s*({})", NUMBER)).unwrap()
    })
}

fn k_point_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*k-point\s+\d+\s*:").unwrap())
}

fn spin_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*#\s*of\s+k-points:\s*(\d+)\s*#\s*of\s+bands:\s*(\d+)\s*#\s*of\s+ions:\s*(\d+)").unwrap()
    })
}

fn band_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"band\s+(\d+)\s*#\s*energy\s*({0})\s*#\s*occ\.\s*({0})", NUMBER)).unwrap()
    })
}

fn orbital_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*ion[ \t]+(.*\btot)[ \t]*$").unwrap())
}


/// Extract all the numbers in `s`, from left to right.
///
/// VASP does not leave a space between two fixed-width fields when the latter is negative,
/// e.g. `0.00000000-0.01282051`, such `-` always starts a new number.
pub fn get_numbers_from_string(s: &str) -> Vec<f64> {
    number_regex()
        .find_iter(s)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect()
}


/// Parse the `k-point    1 :    0.5 0.25 0.75     weight = 0.00806452` lines, weights kept.
///
/// Lines whose coordinates are not exactly three numbers are skipped.
pub fn k_point_weight_parser(s: &str) -> Vec<([f64; 3], f64)> {
    k_point_regex()
        .captures_iter(s)
        .filter_map(|caps| {
            let coords = get_numbers_from_string(&caps[1]);
            let weight = caps[2].parse::<f64>().ok()?;
            match coords[..] {
                [x, y, z] => Some(([x, y, z], weight)),
                _ => None,
            }
        })
        .collect()
}


/// Parse the fractional coordinates of all the k-point lines, in file order.
pub fn k_point_parser(s: &str) -> MatX3<f64> {
    k_point_weight_parser(s)
        .into_iter()
        .map(|(k, _)| k)
        .collect()
}


/// Split PROCAR content into k-point blocks. Each block starts at its `k-point` line and
/// ends before the next `k-point` line or spin section header.
pub fn split_k_point_blocks(s: &str) -> Vec<&str> {
    let starts = k_point_header_regex()
        .find_iter(s)
        .map(|m| m.start())
        .collect::<Vec<usize>>();

    let mut bounds = starts.iter()
        .copied()
        .chain(spin_header_regex().find_iter(s).map(|m| m.start()))
        .collect::<Vec<usize>>();
    bounds.sort_unstable();

    starts.iter()
        .map(|&beg| {
            let end = bounds.iter()
                .copied()
                .find(|&b| b > beg)
                .unwrap_or(s.len());
            &s[beg .. end]
        })
        .collect()
}


/// Parse the projection tables in `s`, each table is flattened into one row of the
/// returned matrix.
///
/// A table consists of rows leading with ion index and is terminated by a `tot` row, whose
/// leading field is replaced by `0.0`. The header line `ion  s  p  d  tot` is optional
/// since the magnetization tables in non-collinear PROCAR go without it, the last header
/// seen sets the row width of the tables following it.
pub fn projections_parser(s: &str) -> Result<Matrix<f64>> {
    let mut tables: Vec<Vec<f64>> = vec![];
    let mut current: Vec<f64> = vec![];
    let mut header_width: Option<usize> = None;
    let mut row_width: Option<usize> = None;

    for (iline, line) in s.lines().enumerate() {
        let first = line.split_whitespace().next().unwrap_or_default();

        if first == "tot" {
            ensure!(!current.is_empty(),
                "[PROCAR]: Found `tot` row without ion rows ahead at line {}: {:?}", iline + 1, line);

            let mut row = vec![0.0];
            row.extend(get_numbers_from_string(&line[line.find("tot").unwrap_or(0) + 3 ..]));
            if let Some(w) = row_width {
                ensure!(row.len() == w,
                    "[PROCAR]: Inconsistent row width at line {}: expect {} columns, found {}.", iline + 1, w, row.len());
            }

            current.extend(row);
            tables.push(std::mem::take(&mut current));
            row_width = header_width;
        } else if first.parse::<usize>().is_ok() {
            let row = get_numbers_from_string(line);
            match row_width {
                Some(w) => {
                    ensure!(row.len() == w,
                        "[PROCAR]: Inconsistent row width at line {}: expect {} columns, found {}.", iline + 1, w, row.len());
                },
                None => row_width = Some(row.len()),
            }
            current.extend(row);
        } else {
            ensure!(current.is_empty(),
                "[PROCAR]: Projection table is not terminated by a `tot` row at line {}: {:?}", iline + 1, line);
            if first == "ion" {
                header_width = Some(line.split_whitespace().count());
                row_width = header_width;
            }
        }
    }

    ensure!(current.is_empty(), "[PROCAR]: Last projection table is not terminated by a `tot` row.");
    ensure!(!tables.is_empty(), "[PROCAR]: No projection table found.");

    let width = tables[0].len();
    if let Some((itable, t)) = tables.iter().enumerate().find(|(_, t)| t.len() != width) {
        bail!("[PROCAR]: Inconsistent projection table width: table #{} has {} fields while table #1 has {}.",
              itable + 1, t.len(), width);
    }

    let nrows = tables.len();
    let flat = tables.into_iter().flatten().collect::<Vec<f64>>();
    Ok(Array2::from_shape_vec((nrows, width), flat)?)
}


/// Kind of calculation that produced the PROCAR, inferred from its layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationType {
    /// ISPIN = 1
    NonSpinPolarised,
    /// ISPIN = 2, two spin sections each holding all the k-points.
    SpinPolarised,
    /// LNONCOLLINEAR = T, each band has four projection tables: total, mx, my and mz.
    NonCollinear,
}

impl CalculationType {
    pub fn from_spin_channels(n: usize) -> Result<Self> {
        match n {
            1 => Ok(Self::NonSpinPolarised),
            2 => Ok(Self::SpinPolarised),
            4 => Ok(Self::NonCollinear),
            _ => bail!("Invalid number of spin channels: {}, only 1, 2 or 4 is allowed.", n),
        }
    }

    pub fn spin_channels(&self) -> usize {
        match self {
            Self::NonSpinPolarised => 1,
            Self::SpinPolarised    => 2,
            Self::NonCollinear     => 4,
        }
    }
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Self::NonSpinPolarised => "NonSpinPolarised",
            Self::SpinPolarised    => "SpinPolarised",
            Self::NonCollinear     => "NonCollinear",
        };
        f.write_str(description)
    }
}


/// What to do with negative occupations, which appear with some smearing methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NegativeOccupancies {
    #[default]
    Warn,
    Raise,
    Ignore,
    Zero,
}


struct KPointBlock {
    kpoint: [f64; 3],
    weight: f64,
    eigs:   Vec<f64>,
    occs:   Vec<f64>,
    tables: Matrix<f64>,
}


#[derive(Clone, Debug)]
pub struct Procar {
    pub calculation:           CalculationType,
    pub spin_channels:         usize,
    pub number_of_k_points:    usize,
    pub number_of_ions:        usize,
    pub number_of_bands:       usize,
    pub number_of_projections: usize,       // orbitals + tot
    pub orbitals:              Vec<String>,
    pub k_point_blocks:        Vec<String>,
    pub k_points:              Matrix<f64>, // [ikpoint, 3], fractional
    pub weights:               Vector<f64>,
    pub bands:                 Cube<f64>,   // [ispin, ikpoint, iband]
    pub occupancy:             Cube<f64>,   // [ispin, ikpoint, iband]
    pub data:                  Array5<f64>, // [ispin, ikpoint, iband, iion, iorbit], last ion is `tot`
}


impl Procar {
    pub fn from_file(path: &(impl AsRef<Path> + ?Sized)) -> Result<Self> {
        Self::from_file_with(path, NegativeOccupancies::default())
    }

    pub fn from_file_with(path: &(impl AsRef<Path> + ?Sized), negative_occupancies: NegativeOccupancies) -> Result<Self> {
        let path = path.as_ref();
        info!("Reading PROCAR: {:?}", path);
        let txt = read_txt(path)?;
        Self::from_str(&txt, negative_occupancies)
            .with_context(|| format!("Failed to parse {:?} as PROCAR.", path))
    }

    /// Read split PROCARs of one calculation and join their k-points in the given order.
    pub fn from_files<P: AsRef<Path>>(paths: &[P], negative_occupancies: NegativeOccupancies) -> Result<Self> {
        let (first, rest) = paths.split_first()
            .context("[PROCAR]: No PROCAR file given.")?;

        rest.iter()
            .try_fold(Self::from_file_with(first, negative_occupancies)?, |acc, path| {
                let other = Self::from_file_with(path, negative_occupancies)?;
                acc.concat(other)
                    .with_context(|| format!("Cannot append {:?} to previous PROCAR(s).", path.as_ref()))
            })
    }

    pub fn from_str(txt: &str, negative_occupancies: NegativeOccupancies) -> Result<Self> {
        let (nkpoints, nbands, nions, nsections) = Self::parse_dimensions(txt)?;
        let orbitals = Self::parse_orbitals(txt)?;
        let nproj = orbitals.len();
        debug!("[PROCAR]: NKPTS = {}, NBANDS = {}, NIONS = {}, {} spin section(s), orbitals = {:?}",
               nkpoints, nbands, nions, nsections, orbitals);

        let blocks = split_k_point_blocks(txt);
        ensure!(blocks.len() == nsections * nkpoints,
            "[PROCAR]: Expect {} k-point blocks ({} spin section(s) x {} k-points), found {}.",
            nsections * nkpoints, nsections, nkpoints, blocks.len());

        let parsed = blocks.iter()
            .enumerate()
            .map(|(i, b)| {
                Self::parse_k_point_block(b, nbands)
                    .with_context(|| format!("[PROCAR]: Failed to parse k-point block #{}.", i + 1))
            })
            .collect::<Result<Vec<KPointBlock>>>()?;

        let ntables = parsed[0].tables.nrows();
        if let Some(i) = parsed.iter().position(|b| b.tables.nrows() != ntables) {
            bail!("[PROCAR]: K-point block #{} has {} projection tables while block #1 has {}.",
                  i + 1, parsed[i].tables.nrows(), ntables);
        }
        ensure!(ntables % nbands == 0,
            "[PROCAR]: {} projection tables cannot be distributed to {} bands.", ntables, nbands);

        // total only, or total + mx + my + mz
        let ncomponents = ntables / nbands;
        ensure!(ncomponents == 1 || ncomponents == 4,
            "[PROCAR]: Found {} projection tables per band, expect 1 or 4.", ncomponents);
        let calculation = CalculationType::from_spin_channels(nsections * ncomponents)
            .with_context(|| format!("[PROCAR]: Cannot determine spin channels from {} spin section(s) with {} projection tables per band.",
                                     nsections, ncomponents))?;
        let nspin = calculation.spin_channels();

        let width = (nions + 1) * (nproj + 1);
        if let Some(i) = parsed.iter().position(|b| b.tables.ncols() != width) {
            bail!("[PROCAR]: Projection tables in k-point block #{} have {} fields, expect {} = ({} ions + tot) x ({} orbitals + index).",
                  i + 1, parsed[i].tables.ncols(), width, nions, nproj);
        }

        let mut data      = Array5::<f64>::zeros((nspin, nkpoints, nbands, nions + 1, nproj));
        let mut bands     = Array3::<f64>::zeros((nsections, nkpoints, nbands));
        let mut occupancy = Array3::<f64>::zeros((nsections, nkpoints, nbands));

        for (iblock, block) in parsed.iter().enumerate() {
            let isection = iblock / nkpoints;
            let ikpoint  = iblock % nkpoints;

            for iband in 0 .. nbands {
                bands[(isection, ikpoint, iband)]     = block.eigs[iband];
                occupancy[(isection, ikpoint, iband)] = block.occs[iband];
            }

            for (irow, row) in block.tables.rows().into_iter().enumerate() {
                let iband = irow / ncomponents;
                let ispin = if nsections == 2 { isection } else { irow % ncomponents };

                for iion in 0 .. nions + 1 {
                    for iorb in 0 .. nproj {
                        data[(ispin, ikpoint, iband, iion, iorb)] = row[iion * (nproj + 1) + 1 + iorb];
                    }
                }
            }
        }

        if occupancy.iter().any(|&x| x < 0.0) {
            match negative_occupancies {
                NegativeOccupancies::Warn  => warn!("[PROCAR]: Negative occupancies found."),
                NegativeOccupancies::Raise => bail!("[PROCAR]: Negative occupancies found."),
                NegativeOccupancies::Zero  => {
                    warn!("[PROCAR]: Negative occupancies found, set to zero.");
                    occupancy.mapv_inplace(|x| x.max(0.0));
                },
                NegativeOccupancies::Ignore => (),
            }
        }

        let k_points = Array2::from_shape_vec(
            (nkpoints, 3),
            parsed[.. nkpoints].iter().flat_map(|b| b.kpoint).collect::<Vec<f64>>(),
        )?;
        let weights = parsed[.. nkpoints].iter().map(|b| b.weight).collect::<Array1<f64>>();

        Ok(Self {
            calculation,
            spin_channels: nspin,
            number_of_k_points: nkpoints,
            number_of_ions: nions,
            number_of_bands: nbands,
            number_of_projections: nproj,
            orbitals,
            k_point_blocks: blocks.into_iter().map(str::to_string).collect(),
            k_points,
            weights,
            bands,
            occupancy,
            data,
        })
    }


    // Returns (nkpoints, nbands, nions, number of spin sections)
    fn parse_dimensions(txt: &str) -> Result<(usize, usize, usize, usize)> {
        let headers = spin_header_regex()
            .captures_iter(txt)
            .map(|caps| -> Result<(usize, usize, usize)> {
                let v = (1 ..= 3)
                    .map(|i| caps[i].parse::<usize>())
                    .collect::<std::result::Result<Vec<usize>, _>>()?;
                Ok((v[0], v[1], v[2]))
            })
            .collect::<Result<Vec<(usize, usize, usize)>>>()?;

        let dims = *headers.first()
            .context("[PROCAR]: Header `# of k-points: ... # of bands: ... # of ions: ...` not found.")?;
        ensure!(headers.iter().all(|&h| h == dims),
            "[PROCAR]: Spin sections have different dimensions: {:?}.", headers);
        ensure!(headers.len() <= 2,
            "[PROCAR]: Found {} spin sections, at most 2 are allowed.", headers.len());

        let (nkpoints, nbands, nions) = dims;
        ensure!(nkpoints > 0 && nbands > 0 && nions > 0,
            "[PROCAR]: Invalid dimensions: NKPTS = {}, NBANDS = {}, NIONS = {}.", nkpoints, nbands, nions);

        Ok((nkpoints, nbands, nions, headers.len()))
    }

    fn parse_orbitals(txt: &str) -> Result<Vec<String>> {
        let caps = orbital_header_regex()
            .captures(txt)
            .context("[PROCAR]: Projection table header `ion ... tot` not found.")?;
        Ok(caps[1].split_whitespace().map(str::to_string).collect())
    }

    fn parse_k_point_block(block: &str, nbands: usize) -> Result<KPointBlock> {
        let (kpoint, weight) = match k_point_weight_parser(block)[..] {
            [kw] => kw,
            _ => bail!("Malformed k-point line: {:?}", block.lines().next().unwrap_or_default()),
        };

        let (eigs, occs): (Vec<f64>, Vec<f64>) = band_regex()
            .captures_iter(block)
            .map(|caps| -> Result<(f64, f64)> { Ok((caps[2].parse::<f64>()?, caps[3].parse::<f64>()?)) })
            .collect::<Result<Vec<(f64, f64)>>>()?
            .into_iter()
            .unzip();
        ensure!(eigs.len() == nbands, "Expect {} band lines, found {}.", nbands, eigs.len());

        let tables = projections_parser(block)?;

        Ok(KPointBlock { kpoint, weight, eigs, occs, tables })
    }


    /// Number of eigenvalue channels: 2 for spin-polarised, 1 otherwise.
    pub fn eigen_channels(&self) -> usize {
        self.bands.shape()[0]
    }

    pub fn is_ncl(&self) -> bool {
        self.calculation == CalculationType::NonCollinear
    }

    pub fn is_spin_polarised(&self) -> bool {
        self.calculation == CalculationType::SpinPolarised
    }

    /// K-points in cartesian coordinates, `k = sum_i frac_i * b_i` where `b_i` is the i-th
    /// row of `reciprocal_lattice`. Fractional coordinates are returned if no lattice given.
    pub fn cartesian_k_points(&self, reciprocal_lattice: Option<&Mat33<f64>>) -> MatX3<f64> {
        self.k_points
            .rows()
            .into_iter()
            .map(|k| match reciprocal_lattice {
                Some(b) => {
                    let mut ret = [0.0; 3];
                    for i in 0 .. 3 {
                        for j in 0 .. 3 {
                            ret[j] += k[i] * b[i][j];
                        }
                    }
                    ret
                },
                None => [k[0], k[1], k[2]],
            })
            .collect()
    }

    /// Accumulated path length along the k-points, usually serves as x axis of band structure.
    pub fn x_axis(&self, reciprocal_lattice: Option<&Mat33<f64>>) -> Vector<f64> {
        let kpts = self.cartesian_k_points(reciprocal_lattice);
        let mut acc = 0.0;
        let mut prev = kpts.first().copied().unwrap_or_default();

        kpts.iter()
            .map(|k| {
                acc += ((k[0] - prev[0]).powi(2) + (k[1] - prev[1]).powi(2) + (k[2] - prev[2]).powi(2)).sqrt();
                prev = *k;
                acc
            })
            .collect()
    }

    /// Effective mass of one band along the selected k-points.
    ///
    /// All the indices count from 1. Two k-points fall back to the two-point formula, in
    /// which case the first k-point is taken as the band extremum.
    pub fn effective_mass_calc(&self,
                               k_point_indices: &[usize],
                               band_index: usize,
                               spin: usize,
                               reciprocal_lattice: Option<&Mat33<f64>>) -> Result<f64> {
        let nspin = self.eigen_channels();
        ensure!(spin >= 1 && spin <= nspin,
            "Spin index {} out of range, available spin channels: 1 ..= {}.", spin, nspin);
        ensure!(band_index >= 1 && band_index <= self.number_of_bands,
            "Band index {} out of range, available bands: 1 ..= {}.", band_index, self.number_of_bands);
        if let Some(&ik) = k_point_indices.iter().find(|&&ik| ik < 1 || ik > self.number_of_k_points) {
            bail!("K-point index {} out of range, available k-points: 1 ..= {}.", ik, self.number_of_k_points);
        }

        let kpts = self.cartesian_k_points(reciprocal_lattice);
        let points = k_point_indices.iter()
            .map(|&ik| kpts[ik - 1])
            .collect::<MatX3<f64>>();
        let eigenvalues = k_point_indices.iter()
            .map(|&ik| self.bands[(spin - 1, ik - 1, band_index - 1)])
            .collect::<Vec<f64>>();
        debug!("Fitting band {} of spin {} over k-points {:?}: {:?}", band_index, spin, k_point_indices, eigenvalues);

        if points.len() == 2 {
            two_point_effective_mass(&points, &eigenvalues)
        } else {
            least_squares_effective_mass(&points, &eigenvalues)
        }
    }


    /// Append the k-points of `other` after those of `self`.
    ///
    /// Both PROCARs must come from the same kind of calculation with identical ions, bands
    /// and orbitals.
    pub fn concat(self, other: Procar) -> Result<Procar> {
        ensure!(self.calculation == other.calculation,
            "[PROCAR]: Cannot join {} PROCAR with {} one.", self.calculation, other.calculation);
        ensure!(self.number_of_ions == other.number_of_ions,
            "[PROCAR]: Number of ions mismatch: {} vs {}.", self.number_of_ions, other.number_of_ions);
        ensure!(self.number_of_bands == other.number_of_bands,
            "[PROCAR]: Number of bands mismatch: {} vs {}.", self.number_of_bands, other.number_of_bands);
        ensure!(self.orbitals == other.orbitals,
            "[PROCAR]: Orbitals mismatch: {:?} vs {:?}.", self.orbitals, other.orbitals);

        // blocks are stored section by section
        let k_point_blocks = self.k_point_blocks.chunks(self.number_of_k_points)
            .zip(other.k_point_blocks.chunks(other.number_of_k_points))
            .flat_map(|(a, b)| a.iter().chain(b.iter()).cloned())
            .collect::<Vec<String>>();

        Ok(Procar {
            calculation:           self.calculation,
            spin_channels:         self.spin_channels,
            number_of_k_points:    self.number_of_k_points + other.number_of_k_points,
            number_of_ions:        self.number_of_ions,
            number_of_bands:       self.number_of_bands,
            number_of_projections: self.number_of_projections,
            orbitals:              self.orbitals,
            k_point_blocks,
            k_points:              concatenate(Axis(0), &[self.k_points.view(), other.k_points.view()])?,
            weights:               concatenate(Axis(0), &[self.weights.view(), other.weights.view()])?,
            bands:                 concatenate(Axis(1), &[self.bands.view(), other.bands.view()])?,
            occupancy:             concatenate(Axis(1), &[self.occupancy.view(), other.occupancy.view()])?,
            data:                  concatenate(Axis(1), &[self.data.view(), other.data.view()])?,
        })
    }


    /// Projections summed over the selected ions and orbitals for each eigenvalue channel,
    /// in shape `[ispin, ikpoint, iband]`. Indices count from 0, the `tot` row of ions is
    /// not selectable.
    ///
    /// Non-collinear PROCARs contribute their total projections only.
    pub fn projection_weights(&self, ions: &[usize], orbitals: &[usize]) -> Result<Cube<f64>> {
        ensure!(!ions.is_empty() && !orbitals.is_empty(), "[PROCAR]: No ions or orbitals selected.");
        if let Some(i) = ions.iter().find(|&&i| i >= self.number_of_ions) {
            bail!("[PROCAR]: Ion index {} out of range, {} ions available.", i + 1, self.number_of_ions);
        }
        if let Some(i) = orbitals.iter().find(|&&i| i >= self.number_of_projections) {
            bail!("[PROCAR]: Orbital index {} out of range, available orbitals: {:?}.", i + 1, self.orbitals);
        }

        let nspin = self.eigen_channels();
        Ok(self.data
            .slice(s![.. nspin, .., .., .., ..])
            .select(Axis(3), ions)
            .select(Axis(4), orbitals)
            .sum_axis(Axis(4))
            .sum_axis(Axis(3)))
    }
}
