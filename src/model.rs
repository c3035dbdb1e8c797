//! Catalog record types and the closed enumerations describing a capture.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Image spectrum. Thermal captures are called NIR in the original dataset
/// documentation, so both spellings parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Vis,
    Thermal,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Vis => "VIS",
            Modality::Thermal => "THERMAL",
        }
    }
}

impl FromStr for Modality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "VIS" | "VI" => Ok(Modality::Vis),
            "THERMAL" | "NIR" => Ok(Modality::Thermal),
            other => Err(Error::DataIntegrity(format!("unknown modality `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Polarization {
    /// Visible-light captures carry no polarization state.
    #[serde(rename = "N/A")]
    NotApplicable,
    S0,
    S1,
    S2,
    DoLP,
}

impl Polarization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarization::NotApplicable => "N/A",
            Polarization::S0 => "S0",
            Polarization::S1 => "S1",
            Polarization::S2 => "S2",
            Polarization::DoLP => "DoLP",
        }
    }
}

impl FromStr for Polarization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "N/A" | "VIS" => Ok(Polarization::NotApplicable),
            "S0" => Ok(Polarization::S0),
            "S1" => Ok(Polarization::S1),
            "S2" => Ok(Polarization::S2),
            "DP" | "DoLP" | "DOLP" => Ok(Polarization::DoLP),
            other => Err(Error::DataIntegrity(format!("unknown polarization `{}`", other))),
        }
    }
}

/// A validated (modality, polarization) pair.
///
/// Visible captures have no polarization; thermal captures always have one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Capture {
    modality: Modality,
    polarization: Polarization,
}

impl Capture {
    pub fn new(modality: Modality, polarization: Polarization) -> Result<Self> {
        let valid = match modality {
            Modality::Vis => polarization == Polarization::NotApplicable,
            Modality::Thermal => polarization != Polarization::NotApplicable,
        };
        if !valid {
            return Err(Error::DataIntegrity(format!(
                "{} capture cannot have polarization {}",
                modality.as_str(),
                polarization.as_str()
            )));
        }
        Ok(Self { modality, polarization })
    }

    pub fn visible() -> Self {
        Self { modality: Modality::Vis, polarization: Polarization::NotApplicable }
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn polarization(&self) -> Polarization {
        self.polarization
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Condition {
    Baseline,
    Expression,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Baseline => "B",
            Condition::Expression => "E",
        }
    }
}

impl FromStr for Condition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "B" => Ok(Condition::Baseline),
            "E" => Ok(Condition::Expression),
            other => Err(Error::DataIntegrity(format!("unknown condition `{}`", other))),
        }
    }
}

/// Protocol group a file is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    World,
    Dev,
    Eval,
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::World => "world",
            Group::Dev => "dev",
            Group::Eval => "eval",
        }
    }
}

impl FromStr for Group {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "world" => Ok(Group::World),
            "dev" => Ok(Group::Dev),
            "eval" => Ok(Group::Eval),
            other => Err(Error::Configuration(format!("unknown group `{}`", other))),
        }
    }
}

/// Role of a file inside a protocol group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Train,
    Enroll,
    Probe,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Train => "train",
            Purpose::Enroll => "enroll",
            Purpose::Probe => "probe",
        }
    }
}

impl FromStr for Purpose {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Purpose::Train),
            "enroll" => Ok(Purpose::Enroll),
            "probe" => Ok(Purpose::Probe),
            other => Err(Error::Configuration(format!("unknown purpose `{}`", other))),
        }
    }
}

macro_rules! impl_display_as_str {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

impl_display_as_str!(Modality, Polarization, Condition, Group, Purpose);

/// A dataset subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: String,
    pub group: Group,
}

/// An image stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct File {
    pub id: i64,
    pub client_id: String,
    pub image_name: String,
    /// Storage path fragment relative to the dataset root, without extension
    pub path: String,
    pub capture: Capture,
    pub capture_range: String,
    pub condition: Condition,
    pub shot: i64,
    pub year: Option<i32>,
}

impl File {
    pub fn modality(&self) -> Modality {
        self.capture.modality()
    }

    pub fn polarization(&self) -> Polarization {
        self.capture.polarization()
    }

    /// Full path of the image under `directory` with the given extension.
    pub fn make_path(&self, directory: &str, extension: &str) -> String {
        let mut path = std::path::PathBuf::from(directory);
        path.push(format!("{}{}", self.path, extension));
        path.to_string_lossy().to_string()
    }
}

/// Eye landmarks for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub file_id: i64,
    pub re_x: i32,
    pub re_y: i32,
    pub le_x: i32,
    pub le_y: i32,
}

/// One row of the protocol/file association
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolAssignment {
    pub protocol: String,
    pub group: Group,
    pub purpose: Purpose,
    pub file_id: i64,
}
