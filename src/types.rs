use std::sync::OnceLock;

use anyhow::{
    bail,
    Context,
};
use ndarray::{
    Array1,
    Array2,
    Array3,
};
use regex::Regex;

pub type Result<T> = anyhow::Result<T>;

pub type Vector<T> = Array1<T>;  // Define this type to use broadcast operations.
pub type Matrix<T> = Array2<T>;
pub type Cube<T>   = Array3<T>;
pub type MatX3<T> = Vec<[T;3]>;  // Nx3 matrix
pub type Mat33<T> = [[T;3];3];   // 3x3 matrix


/// Parse a single index or an inclusive range, e.g. `3`, `-1`, `1..4` or `-3..-1`.
///
/// Indices count from 1, negative ones count from the tail. Zero is kept as is and means
/// "everything" to `index_transform`.
pub fn range_parse(input: &str) -> Result<Vec<i32>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(-?\d+)\.\.(-?\d+)$").unwrap());
    let input = input.trim();

    if let Some(caps) = re.captures(input) {
        let start = caps[1].parse::<i32>()?;
        let end   = caps[2].parse::<i32>()?;
        if (start < 0) != (end < 0) {
            bail!("Mixing negative and positive bounds in range {:?} is not allowed.", input);
        }
        if start > end {
            bail!("Invalid range {:?}: start is larger than end.", input);
        }
        Ok((start ..= end).collect())
    } else {
        let i = input.parse::<i32>()
            .with_context(|| format!("Cannot parse {:?} as index or range.", input))?;
        Ok(vec![i])
    }
}


/// Map indices from `range_parse` to ones counting from 1. Negative indices are expected
/// to be within `-len ..= -1`.
pub fn index_transform(v: Vec<i32>, len: usize) -> Vec<usize> {
    if v.contains(&0) {
        (1 ..= len).collect()
    } else {
        v.into_iter()
         .map(|i| {
            if i < 0 {
                i.rem_euclid(len as i32) as usize + 1
            } else {
                i as usize
            }
         })
        .collect()
    }
}
