//! Persistence of fitted material bases and weights.
//!
//! The basis is stored as `basisFunctions.csv`: for every material `b` three
//! lines `Red#b`, `Green#b` and `Blue#b` holding the specular curve samples
//! `0..=resolution`, followed by one `Diffuse#b, r, g, b` line per material.
//! Floats are written with their shortest round-trip representation.

use crate::{
    decomposition::SpecularDecomposition,
    material::{MaterialBasis, SimpleMaterialBasis},
};
use base::{
    error::{RuntimeError, SpecFitError},
    math::DVec3,
    Channel,
};
use std::path::Path;

/// File name of the serialised material basis.
pub const BASIS_FILE_NAME: &str = "basisFunctions.csv";

/// File name of the serialised per-texel weights.
pub const WEIGHTS_FILE_NAME: &str = "weights.csv";

fn csv_error(err: csv::Error, message: String) -> SpecFitError {
    SpecFitError::new(message, Some(Box::new(err)))
}

fn create_dir(dir: &Path) -> Result<(), SpecFitError> {
    std::fs::create_dir_all(dir).map_err(|err| {
        SpecFitError::from_io_error(err, format!("Failed to create directory {}", dir.display()))
    })
}

/// Writes a material basis into `dir/basisFunctions.csv`.
pub fn save_basis<M: MaterialBasis + ?Sized>(basis: &M, dir: &Path) -> Result<(), SpecFitError> {
    create_dir(dir)?;
    let path = dir.join(BASIS_FILE_NAME);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&path)
        .map_err(|err| csv_error(err, format!("Failed to create {}", path.display())))?;
    let write_err = |err| csv_error(err, format!("Failed to write {}", path.display()));

    for b in 0..basis.material_count() {
        for channel in Channel::ALL {
            let record = std::iter::once(format!("{}#{}", channel.name(), b)).chain(
                (0..=basis.specular_resolution())
                    .map(|m| basis.evaluate_specular(channel, b, m).to_string()),
            );
            writer.write_record(record).map_err(write_err)?;
        }
    }
    for b in 0..basis.material_count() {
        let diffuse = basis.diffuse_color(b);
        writer
            .write_record([
                format!("Diffuse#{}", b),
                diffuse.x.to_string(),
                diffuse.y.to_string(),
                diffuse.z.to_string(),
            ])
            .map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|err| SpecFitError::from_io_error(err, format!("Failed to write {}", path.display())))?;
    log::info!("Basis functions saved to {}", path.display());
    Ok(())
}

fn malformed(line: u64, reason: String) -> SpecFitError {
    SpecFitError::from_runtime_error(
        RuntimeError::MalformedBasis {
            line: line as usize,
            reason,
        },
        "Failed to parse basis functions",
    )
}

/// Numeric fields of a record after its tag; a trailing empty field left by
/// a trailing comma is ignored.
fn parse_values(record: &csv::StringRecord, line: u64) -> Result<Vec<f64>, SpecFitError> {
    let mut fields = record.iter().skip(1).collect::<Vec<_>>();
    if fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }
    fields
        .into_iter()
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| malformed(line, format!("'{}' is not a number", f)))
        })
        .collect()
}

/// Reads a material basis from `dir/basisFunctions.csv`.
///
/// The specular resolution is inferred from the first line. Materials
/// without a `Diffuse` line get a black diffuse albedo.
pub fn load_basis(dir: &Path) -> Result<SimpleMaterialBasis, SpecFitError> {
    let path = dir.join(BASIS_FILE_NAME);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|err| csv_error(err, format!("Failed to open {}", path.display())))?;

    let mut curves: Vec<Vec<f64>> = Vec::new();
    let mut diffuse: Vec<DVec3> = Vec::new();
    let mut resolution = None;
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|err| csv_error(err, format!("Failed to read {}", path.display())))?;
        let line = record.position().map_or(i as u64 + 1, |pos| pos.line());
        let tag = record.get(0).unwrap_or_default();
        let values = parse_values(&record, line)?;

        if tag.starts_with("Diffuse") {
            let expected = format!("Diffuse#{}", diffuse.len());
            if tag != expected {
                return Err(malformed(line, format!("expected '{}', found '{}'", expected, tag)));
            }
            if values.len() != 3 {
                return Err(malformed(line, format!("expected 3 values, found {}", values.len())));
            }
            diffuse.push(DVec3::new(values[0], values[1], values[2]));
            continue;
        }
        if !diffuse.is_empty() {
            return Err(malformed(line, format!("unexpected '{}' after diffuse colours", tag)));
        }

        let channel = Channel::ALL[curves.len() % Channel::COUNT];
        let expected = format!("{}#{}", channel.name(), curves.len() / Channel::COUNT);
        if tag != expected {
            return Err(malformed(line, format!("expected '{}', found '{}'", expected, tag)));
        }
        let count = *resolution.get_or_insert(values.len());
        if count < 2 || values.len() != count {
            return Err(malformed(
                line,
                format!("expected {} curve samples, found {}", count.max(2), values.len()),
            ));
        }
        curves.push(values);
    }

    if curves.is_empty() {
        return Err(malformed(1, String::from("no basis functions")));
    }
    if curves.len() % Channel::COUNT != 0 {
        return Err(malformed(
            curves.len() as u64 + 1,
            String::from("incomplete specular curves"),
        ));
    }
    let material_count = curves.len() / Channel::COUNT;
    if diffuse.len() > material_count {
        return Err(malformed(
            (curves.len() + diffuse.len()) as u64,
            format!("{} diffuse colours for {} materials", diffuse.len(), material_count),
        ));
    }

    let mut basis = SimpleMaterialBasis::new(material_count, resolution.map_or(0, |count| count - 1));
    for (i, curve) in curves.iter().enumerate() {
        basis.set_specular_curve(Channel::ALL[i % Channel::COUNT], i / Channel::COUNT, curve);
    }
    for (b, color) in diffuse.into_iter().enumerate() {
        basis.set_diffuse_color(b, color);
    }
    log::info!(
        "Loaded {} basis functions of resolution {} from {}",
        basis.material_count(),
        basis.specular_resolution(),
        path.display()
    );
    Ok(basis)
}

/// Writes the per-texel weights and validity into `dir/weights.csv`.
pub fn save_weights(decomposition: &SpecularDecomposition, dir: &Path) -> Result<(), SpecFitError> {
    create_dir(dir)?;
    let path = dir.join(WEIGHTS_FILE_NAME);
    let mut writer = csv::Writer::from_path(&path)
        .map_err(|err| csv_error(err, format!("Failed to create {}", path.display())))?;
    let write_err = |err| csv_error(err, format!("Failed to write {}", path.display()));

    let header = ["texel".to_string(), "valid".to_string()]
        .into_iter()
        .chain((0..decomposition.basis_count()).map(|b| format!("weight{}", b)));
    writer.write_record(header).map_err(write_err)?;
    for p in 0..decomposition.texel_count() {
        let record = [p.to_string(), (decomposition.are_weights_valid(p) as u8).to_string()]
            .into_iter()
            .chain(decomposition.weights(p).iter().map(|w| w.to_string()));
        writer.write_record(record).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|err| SpecFitError::from_io_error(err, format!("Failed to write {}", path.display())))?;
    log::info!("Weights saved to {}", path.display());
    Ok(())
}
