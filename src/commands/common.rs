use std::{
    io::Write,
    fs,
    path::Path,
};

use anyhow::{
    bail,
    ensure,
    Context,
};

use crate::types::{
    Result,
    Vector,
    range_parse,
    index_transform,
};


/// Write columns of data into a text file, with `comment` as the leading line.
pub fn write_array_to_txt(file_name: &(impl AsRef<Path> + ?Sized), ys: &[&Vector<f64>], comment: &str) -> Result<()> {
    let nrow = ys.first().context("[WRT_ARRAY]: No data set to write.")?.len();

    if nrow == 0 || !ys.iter().all(|y| y.len() == nrow) {
        bail!("[WRT_ARRAY]: input data with zero length or they don't have consistent lengths");
    }

    let mut f = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(file_name)?;

    writeln!(f, "# {}", comment.trim())?;

    for irow in 0 .. nrow {
        let mut s = String::with_capacity(17 * ys.len() + 1);
        for y in ys.iter() {
            s.push_str(&format!("  {:15.6}", y[irow]));
        }
        s.push('\n');

        f.write_all(s.as_bytes())?;
    }

    Ok(())
}


/// Parse whitespace separated indices or ranges into indices counting from 1.
///
/// Negative indices count from the tail, `0` selects everything. The order of input is kept
/// since it matters for a path in k-space.
pub fn parse_indices(input: &str, len: usize, what: &str) -> Result<Vec<usize>> {
    ensure!(!input.trim().is_empty(), "No {} selected.", what);

    let parsed = input.split_whitespace()
        .map(range_parse)
        .collect::<Result<Vec<Vec<i32>>>>()?;

    if let Some(i) = parsed.iter().flatten().find(|&&i| i.unsigned_abs() as usize > len) {
        bail!("Selected {} index {} out of range, {} available.", what, i, len);
    }

    let ret = parsed.into_iter()
        .flat_map(|x| index_transform(x, len))
        .collect::<Vec<usize>>();

    if let Some(i) = ret.iter().find(|&&i| i < 1 || i > len) {
        bail!("Selected {} index {} out of range 1 ..= {}.", what, i, len);
    }

    Ok(ret)
}


/// Parse the ion selection into indices counting from 0, sorted and deduplicated. All the
/// ions are selected if left blank.
pub fn parse_iions(input: Option<&str>, nions: usize) -> Result<Vec<usize>> {
    let mut ret = match input {
        Some(ions) => parse_indices(ions, nions, "ion")?,
        None => (1 ..= nions).collect(),
    };
    ret.sort_unstable();
    ret.dedup();
    Ok(ret.into_iter().map(|i| i - 1).collect())
}


/// Parse the orbitals' name and convert to orbital index, sorted and deduplicated. All the
/// orbitals but `tot` are selected if left blank.
pub fn parse_iorbitals(input: Option<&str>, orbitals: &[String]) -> Result<Vec<usize>> {
    if let Some(input) = input {
        ensure!(!input.trim().is_empty(), "No orbital selected.");

        let mut ret = input.split_whitespace()
            .map(|x| {
                orbitals.iter().position(|o| o == x)
                    .with_context(|| format!("Selected orbital {:?} not available in {:?}", x, orbitals))
            })
            .collect::<Result<Vec<usize>>>()?;

        ret.sort_unstable();
        ret.dedup();
        Ok(ret)
    } else {
        Ok((0 .. orbitals.len()).filter(|&i| orbitals[i] != "tot").collect())
    }
}
