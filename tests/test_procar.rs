use std::path::PathBuf;
use std::io::{
    self,
    Write,
};
use std::fs;

use approx::assert_relative_eq;
use flate2::{
    Compression,
    write::GzEncoder,
};
use tempdir::TempDir;

use rsprocar::{
    Result,
    Procar,
    CalculationType,
    NegativeOccupancies,
    effmass::EV_TO_HARTREE,
    commands::{
        gap::Gap,
        band::Band,
    },
};


macro_rules! get_fpath_in_current_dir {
    ($fname:expr) => {{
        let mut path = PathBuf::from(file!());
        path.pop();
        path.push($fname);
        path
    }}
}


const NOCC: usize = 50;

// Valence bands bend down and conduction bands bend up, both with curvature 0.5 eV per
// squared fractional unit. Spin down is shifted by 0.1 eV.
fn eigenvalue(isection: usize, ik: usize, ib: usize) -> f64 {
    let kx = 0.05 * ik as f64;
    let k2 = 2.0 * kx * kx;
    let e = if ib < NOCC {
        ib as f64 - 60.0 - 0.5 * k2
    } else {
        ib as f64 - 60.0 + 0.5 * k2
    };
    e + 0.1 * isection as f64
}


// K-points run along (1, -1, 0), which makes VASP glue the fields of negative y together.
fn synthetic_procar(nkpts: usize, nbands: usize, nions: usize, spin_polarised: bool) -> String {
    let mut s = String::from("PROCAR lm decomposed\n");
    let nsections = if spin_polarised { 2 } else { 1 };

    for isection in 0 .. nsections {
        s.push_str(&format!("# of k-points:{:5}         # of bands:{:5}         # of ions:{:5}\n\n",
                            nkpts, nbands, nions));
        for ik in 0 .. nkpts {
            let kx = 0.05 * ik as f64;
            s.push_str(&format!(" k-point {:5} :    {:11.8}{:11.8}{:11.8}     weight = {:10.8}\n\n",
                                ik + 1, kx, -kx, 0.0, 1.0 / nkpts as f64));

            for ib in 0 .. nbands {
                let occ = if ib < NOCC { 1.0 } else { 0.0 };
                s.push_str(&format!("band {:5} # energy {:13.8} # occ. {:11.8}\n\n",
                                    ib + 1, eigenvalue(isection, ik, ib), occ));
                s.push_str("ion      s      p      d    tot\n");

                let mut tot = [0.0f64; 3];
                for iion in 0 .. nions {
                    let v = [0.001 * ((iion + ib) % 7) as f64, 0.002, 0.001 * isection as f64];
                    tot.iter_mut().zip(v.iter()).for_each(|(t, x)| *t += x);
                    s.push_str(&format!("{:5} {:7.3}{:7.3}{:7.3}{:7.3}\n",
                                        iion + 1, v[0], v[1], v[2], v.iter().sum::<f64>()));
                }
                s.push_str(&format!("tot   {:7.3}{:7.3}{:7.3}{:7.3}\n\n",
                                    tot[0], tot[1], tot[2], tot.iter().sum::<f64>()));
            }
            s.push('\n');
        }
    }

    s
}


#[test]
fn test_ncl_procar_is_read_from_file() -> Result<()> {
    let fname = get_fpath_in_current_dir!("PROCAR_ncl");
    let procar = Procar::from_file(&fname)?;

    assert_eq!(procar.calculation, CalculationType::NonCollinear);
    assert!(procar.is_ncl());
    assert_eq!(procar.spin_channels, 4);
    assert_eq!(procar.number_of_ions, 22);
    assert_eq!(procar.number_of_bands, 4);
    assert_eq!(procar.number_of_k_points, 2);
    assert_eq!(procar.number_of_projections, 10);
    assert_eq!(procar.orbitals.first().map(String::as_str), Some("s"));
    assert_eq!(procar.orbitals.last().map(String::as_str), Some("tot"));
    assert_eq!(procar.k_point_blocks.len(), 2);

    assert_eq!(procar.k_points.row(1).to_vec(), vec![0.5, -0.25, 0.0]);
    assert_eq!(procar.weights.to_vec(), vec![0.5, 0.5]);

    assert_eq!(procar.eigen_channels(), 1);
    assert_eq!(procar.bands.shape(), &[1, 2, 4]);
    assert_eq!(procar.bands[(0, 1, 3)], 2.25);
    assert_eq!(procar.occupancy[(0, 0, 1)], 1.0);
    assert_eq!(procar.occupancy[(0, 0, 2)], 0.0);

    assert_eq!(procar.data.shape(), &[4, 2, 4, 23, 10]);
    assert_eq!(procar.data[(0, 1, 0, 4, 9)],   0.756);   // total, ion 5
    assert_eq!(procar.data[(1, 1, 0, 0, 0)],  -0.049);   // mx, ion 1, s
    assert_eq!(procar.data[(3, 1, 3, 21, 8)],  0.069);   // mz, ion 22, x2-y2
    assert_eq!(procar.data[(0, 1, 2, 22, 9)],  9.142);   // total, tot row
    Ok(())
}


#[test]
fn test_spin_polarised_procar_is_read_from_file() -> Result<()> {
    let tmpdir = TempDir::new("rsprocar_test")?;
    let fname = tmpdir.path().join("PROCAR_spin_polarised");
    fs::write(&fname, synthetic_procar(8, 112, 25, true))?;

    let procar = Procar::from_file(&fname)?;
    assert_eq!(procar.calculation, CalculationType::SpinPolarised);
    assert!(procar.is_spin_polarised());
    assert_eq!(procar.spin_channels, 2);
    assert_eq!(procar.number_of_ions, 25);
    assert_eq!(procar.number_of_bands, 112);
    assert_eq!(procar.number_of_k_points, 8);
    assert_eq!(procar.k_point_blocks.len(), 16);

    assert_eq!(procar.bands.shape(), &[2, 8, 112]);
    assert_eq!(procar.data.shape(), &[2, 8, 112, 26, 4]);
    assert_eq!(procar.k_points.row(7).to_vec(), vec![0.35, -0.35, 0.0]);
    assert_relative_eq!(procar.bands[(1, 3, 70)], eigenvalue(1, 3, 70), epsilon = 1E-8);
    assert_eq!(procar.data[(1, 5, 9, 2, 2)], 0.001);
    assert_eq!(procar.data[(0, 5, 9, 2, 2)], 0.0);
    Ok(())
}


#[test]
fn test_gzipped_procar_is_read_from_file() -> Result<()> {
    let tmpdir = TempDir::new("rsprocar_test")?;
    let txt = synthetic_procar(4, 60, 3, false);

    let plain = tmpdir.path().join("PROCAR");
    fs::write(&plain, &txt)?;

    let gzipped = tmpdir.path().join("PROCAR.gz");
    let mut encoder = GzEncoder::new(fs::File::create(&gzipped)?, Compression::default());
    encoder.write_all(txt.as_bytes())?;
    encoder.finish()?;

    let p1 = Procar::from_file(&plain)?;
    let p2 = Procar::from_file(&gzipped)?;
    assert_eq!(p1.calculation, CalculationType::NonSpinPolarised);
    assert_eq!(p1.spin_channels, 1);
    assert_eq!(p1.bands, p2.bands);
    assert_eq!(p1.data, p2.data);
    Ok(())
}


#[test]
fn test_missing_procar() {
    let err = Procar::from_file("/surely/not/existing/PROCAR").unwrap_err();
    let ioerr = err.downcast_ref::<io::Error>().expect("expect an io::Error");
    assert_eq!(ioerr.kind(), io::ErrorKind::NotFound);
}


#[test]
fn test_negative_occupancies_are_raised() -> Result<()> {
    let txt = synthetic_procar(2, 60, 2, false)
        .replacen("# occ.  0.00000000", "# occ. -0.00100000", 1);
    assert!(Procar::from_str(&txt, NegativeOccupancies::Raise).is_err());

    let procar = Procar::from_str(&txt, NegativeOccupancies::Zero)?;
    assert!(procar.occupancy.iter().all(|&x| x >= 0.0));
    Ok(())
}


#[test]
fn test_effective_mass_from_procar() -> Result<()> {
    let procar = Procar::from_str(&synthetic_procar(8, 60, 2, true), NegativeOccupancies::Warn)?;
    let expected = 1.0 / EV_TO_HARTREE;

    // conduction band, E = 0.5 * |k|^2
    let mass = procar.effective_mass_calc(&[1, 2, 3, 4, 5], 55, 1, None)?;
    assert_relative_eq!(mass, expected, max_relative = 1E-5);

    // valence band of spin down, along the opposite direction
    let mass = procar.effective_mass_calc(&[8, 7, 6, 5, 4, 3, 2, 1], 50, 2, None)?;
    assert_relative_eq!(mass, -expected, max_relative = 1E-5);

    // two points with the extremum first
    let mass = procar.effective_mass_calc(&[1, 3], 51, 1, None)?;
    assert_relative_eq!(mass, expected, max_relative = 1E-5);

    // reciprocal lattice scales k
    let b = [[2.0, 0.0, 0.0],
             [0.0, 2.0, 0.0],
             [0.0, 0.0, 2.0]];
    let mass = procar.effective_mass_calc(&[1, 2, 3], 55, 1, Some(&b))?;
    assert_relative_eq!(mass, 4.0 * expected, max_relative = 1E-5);
    Ok(())
}


#[test]
fn test_band_edges() -> Result<()> {
    let procar = Procar::from_str(&synthetic_procar(8, 60, 2, true), NegativeOccupancies::Warn)?;
    let edges = Gap::find_band_edges(&procar)?.expect("semiconductor expected");
    assert_eq!(edges.len(), 2);
    for (ispin, e) in edges.iter().enumerate() {
        assert_eq!(e.cbidx, NOCC);
        assert!(e.is_direct());
        assert_eq!(e.cbmik, 0);
        assert_relative_eq!(e.gap(), 1.0, epsilon = 1E-8);
        assert_relative_eq!(e.vbm, -11.0 + 0.1 * ispin as f64, epsilon = 1E-8);
    }

    let procar = Procar::from_file(&get_fpath_in_current_dir!("PROCAR_ncl"))?;
    let edges = Gap::find_band_edges(&procar)?.expect("semiconductor expected");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].cbidx, 2);
    assert_eq!(edges[0].cbm, 0.0);
    assert_eq!(edges[0].vbm, -2.0);
    Ok(())
}


#[test]
fn test_metal_has_no_band_edges() -> Result<()> {
    // band 50 gets emptied at the last k-point
    let txt = synthetic_procar(3, 60, 2, false);
    let last = txt.rfind(" k-point").unwrap();
    let (head, tail) = txt.split_at(last);
    let tail = tail.replacen(&format!("band    50 # energy {:13.8} # occ.  1.00000000", eigenvalue(0, 2, 49)),
                             &format!("band    50 # energy {:13.8} # occ.  0.00000000", eigenvalue(0, 2, 49)), 1);
    assert_ne!(tail, &txt[last ..]);

    let procar = Procar::from_str(&format!("{}{}", head, tail), NegativeOccupancies::Warn)?;
    assert_eq!(Gap::find_band_edges(&procar)?, None);
    Ok(())
}


#[test]
fn test_band_columns() -> Result<()> {
    let procar = Procar::from_str(&synthetic_procar(4, 60, 2, true), NegativeOccupancies::Warn)?;
    let (columns, comment) = Band::band_columns(&procar);

    assert_eq!(columns.len(), 1 + 2 * 60);
    assert!(columns.iter().all(|c| c.len() == 4));
    assert_eq!(columns[0][0], 0.0);
    assert_relative_eq!(columns[0][3], 0.15 * 2.0f64.sqrt(), epsilon = 1E-10);
    assert_eq!(columns[61][2], procar.bands[(1, 2, 0)]);
    assert!(comment.starts_with("kpath band1_up band2_up"));
    assert!(comment.ends_with("band60_dn"));
    Ok(())
}


#[test]
fn test_split_procars_are_joined() -> Result<()> {
    let tmpdir = TempDir::new("rsprocar_test")?;
    let first  = tmpdir.path().join("PROCAR_1");
    let second = tmpdir.path().join("PROCAR_2.gz");
    fs::write(&first, synthetic_procar(4, 60, 2, true))?;

    let mut encoder = GzEncoder::new(fs::File::create(&second)?, Compression::default());
    encoder.write_all(synthetic_procar(3, 60, 2, true).as_bytes())?;
    encoder.finish()?;

    let procar = Procar::from_files(&[&first, &second], NegativeOccupancies::Warn)?;
    assert_eq!(procar.calculation, CalculationType::SpinPolarised);
    assert_eq!(procar.number_of_k_points, 7);
    assert_eq!(procar.k_point_blocks.len(), 14);
    assert_eq!(procar.k_points.shape(), &[7, 3]);
    assert_eq!(procar.bands.shape(), &[2, 7, 60]);
    assert_eq!(procar.data.shape(), &[2, 7, 60, 3, 4]);

    // k-points of the second file go after those of the first one, for both spins
    assert_eq!(procar.k_points.row(4).to_vec(), vec![0.0, 0.0, 0.0]);
    assert_relative_eq!(procar.bands[(1, 6, 3)], eigenvalue(1, 2, 3), epsilon = 1E-8);
    assert_relative_eq!(procar.bands[(0, 3, 3)], eigenvalue(0, 3, 3), epsilon = 1E-8);
    assert!(procar.k_point_blocks[4].trim_start().starts_with("k-point     1 :"));
    assert!(procar.k_point_blocks[7].trim_start().starts_with("k-point     1 :"));

    let fewer_bands = tmpdir.path().join("PROCAR_3");
    fs::write(&fewer_bands, synthetic_procar(3, 58, 2, true))?;
    assert!(Procar::from_files(&[&first, &fewer_bands], NegativeOccupancies::Warn).is_err());

    let non_spin_polarised = tmpdir.path().join("PROCAR_4");
    fs::write(&non_spin_polarised, synthetic_procar(3, 60, 2, false))?;
    assert!(Procar::from_files(&[&first, &non_spin_polarised], NegativeOccupancies::Warn).is_err());

    let none: [&PathBuf; 0] = [];
    assert!(Procar::from_files(&none, NegativeOccupancies::Warn).is_err());
    Ok(())
}


#[test]
fn test_weight_columns() -> Result<()> {
    let procar = Procar::from_file(&get_fpath_in_current_dir!("PROCAR_ncl"))?;

    let (columns, comment) = Band::weight_columns(&procar, Some("5"), Some("tot"))?;
    assert_eq!(columns.len(), 1 + 4);
    assert_eq!(columns[1][1], 0.756);
    assert_eq!(comment, "kpath band1 band2 band3 band4");

    // every ion, every orbital except tot
    let (columns, _) = Band::weight_columns(&procar, None, Some("s py"))?;
    let expected = (0 .. 22).map(|iion| procar.data[(0, 0, 2, iion, 0)] + procar.data[(0, 0, 2, iion, 1)])
        .sum::<f64>();
    assert_relative_eq!(columns[3][0], expected, epsilon = 1E-10);

    assert!(Band::weight_columns(&procar, Some("23"), None).is_err());
    assert!(Band::weight_columns(&procar, None, Some("f")).is_err());

    let procar = Procar::from_str(&synthetic_procar(4, 60, 3, true), NegativeOccupancies::Warn)?;
    let (columns, comment) = Band::weight_columns(&procar, Some("1..2"), Some("d"))?;
    assert_eq!(columns.len(), 1 + 2 * 60);
    assert!(comment.ends_with("band60_dn"));
    assert_relative_eq!(columns[61 + 7][2], 0.002, epsilon = 1E-10);
    assert_eq!(columns[1 + 7][2], 0.0);
    Ok(())
}
