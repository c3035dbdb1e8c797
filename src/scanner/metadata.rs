//! Structured metadata from dataset file names.
//!
//! Visible images: `ANN_IODXXXYY_Z_VI_fMM`
//! - `ANN` client id
//! - `IODXXXYY` inter-ocular distance and distance
//! - `Z` condition, `B` baseline or `E` expression
//! - `MM` shot
//!
//! Thermal images: `ANN_RM_Z_XX_fWW`
//! - `RM` capture range (`R1` 2.5m, `R2` 5m, `R3` 7.5m)
//! - `XX` polarization (`S0`, `S1`, `S2`, `DP`)
//! - `WW` shot

use std::path::{Component, Path};

use crate::error::{Error, Result};
use crate::model::{Capture, Condition, Modality, Polarization};

/// Range given to visible captures, which are all taken at the nearest distance.
const VISIBLE_RANGE: &str = "R1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub client_id: String,
    pub capture_range: String,
    pub condition: Condition,
    pub capture: Capture,
    pub shot: i64,
}

pub fn parse_file_name(stem: &str) -> Result<FileMetadata> {
    let fail = |reason: String| Error::Metadata { name: stem.to_string(), reason };

    let elements: Vec<&str> = stem.split('_').collect();
    if elements.len() != 5 {
        return Err(fail(format!("expected 5 fields, found {}", elements.len())));
    }
    if elements[0].is_empty() {
        return Err(fail("empty client id".to_string()));
    }

    let condition: Condition = elements[2].parse().map_err(|e: Error| fail(e.to_string()))?;
    let shot = parse_shot(elements[4]).ok_or_else(|| fail(format!("bad shot `{}`", elements[4])))?;

    let (capture_range, capture) = if elements[3] == "VI" {
        (VISIBLE_RANGE.to_string(), Capture::visible())
    } else {
        let range = elements[1];
        let valid_range = range.len() == 2
            && range.starts_with('R')
            && range[1..].chars().all(|c| c.is_ascii_digit());
        if !valid_range {
            return Err(fail(format!("bad capture range `{}`", range)));
        }
        let polarization: Polarization =
            elements[3].parse().map_err(|e: Error| fail(e.to_string()))?;
        let capture = Capture::new(Modality::Thermal, polarization)
            .map_err(|e| fail(e.to_string()))?;
        (range.to_string(), capture)
    };

    Ok(FileMetadata {
        client_id: elements[0].to_string(),
        capture_range,
        condition,
        capture,
        shot,
    })
}

/// `f01` -> 1
fn parse_shot(field: &str) -> Option<i64> {
    field.strip_prefix('f')?.parse().ok()
}

/// First path component that reads as a four-digit capture year.
pub fn year_from_path(relative: &Path) -> Option<i32> {
    relative.components().find_map(|component| match component {
        Component::Normal(name) => {
            let name = name.to_str()?;
            if name.len() != 4 || !name.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let year: i32 = name.parse().ok()?;
            (1900..=2100).contains(&year).then_some(year)
        }
        _ => None,
    })
}
