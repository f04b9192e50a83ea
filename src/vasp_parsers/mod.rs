use std::{
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::Context;
use flate2::read::GzDecoder;

use crate::types::Result;

pub mod procar;


/// Read the whole text file into memory, decompressing it on the fly if the file name
/// ends with `.gz`.
pub fn read_txt(path: &(impl AsRef<Path> + ?Sized)) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open file {:?}.", path))?;

    let mut txt = String::new();
    if path.extension().map_or(false, |ext| ext == "gz") {
        GzDecoder::new(file).read_to_string(&mut txt)
            .with_context(|| format!("Failed to decompress {:?}.", path))?;
    } else {
        let mut file = file;
        file.read_to_string(&mut txt)
            .with_context(|| format!("Failed to read {:?}.", path))?;
    }

    Ok(txt)
}
