//! Login screen coordinates and their on-disk record
//!
//! A [`LoginCoordinateSet`] always holds both fields. On disk it is stored as
//! the flat `{username_x, username_y, password_x, password_y}` record used by
//! existing calibration files, one JSON file per `login_coords_<name>`.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AutoLoginError;

/// File name prefix for stored coordinate records
pub const COORDS_PREFIX: &str = "login_coords_";

const DEFAULT_USERNAME: (i32, i32) = (1692, 737);
const DEFAULT_PASSWORD: (i32, i32) = (1734, 854);

/// An absolute screen position with a label for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub label: String,
}

impl Coordinate {
    pub fn new(x: i32, y: i32, label: impl Into<String>) -> Self {
        Self {
            x,
            y,
            label: label.into(),
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: X: {}, Y: {}", self.label, self.x, self.y)
    }
}

/// The two fields of a login form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateField {
    Username,
    Password,
}

impl CoordinateField {
    pub const ALL: [CoordinateField; 2] = [CoordinateField::Username, CoordinateField::Password];

    pub fn label(self) -> &'static str {
        match self {
            CoordinateField::Username => "Username Field",
            CoordinateField::Password => "Password Field",
        }
    }

    fn default_position(self) -> (i32, i32) {
        match self {
            CoordinateField::Username => DEFAULT_USERNAME,
            CoordinateField::Password => DEFAULT_PASSWORD,
        }
    }

    fn default_coordinate(self) -> Coordinate {
        let (x, y) = self.default_position();
        Coordinate::new(x, y, self.label())
    }
}

impl FromStr for CoordinateField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "username" | "user" => Ok(CoordinateField::Username),
            "password" | "pass" => Ok(CoordinateField::Password),
            other => Err(format!("unknown field '{}'", other)),
        }
    }
}

impl fmt::Display for CoordinateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateField::Username => f.write_str("username"),
            CoordinateField::Password => f.write_str("password"),
        }
    }
}

/// Screen positions of the username and password fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCoordinateSet {
    pub username: Coordinate,
    pub password: Coordinate,
}

impl Default for LoginCoordinateSet {
    fn default() -> Self {
        Self {
            username: CoordinateField::Username.default_coordinate(),
            password: CoordinateField::Password.default_coordinate(),
        }
    }
}

impl LoginCoordinateSet {
    /// Build a set from raw positions, using the standard field labels
    pub fn new(username: (i32, i32), password: (i32, i32)) -> Self {
        Self {
            username: Coordinate::new(username.0, username.1, CoordinateField::Username.label()),
            password: Coordinate::new(password.0, password.1, CoordinateField::Password.label()),
        }
    }

    pub fn get(&self, field: CoordinateField) -> &Coordinate {
        match field {
            CoordinateField::Username => &self.username,
            CoordinateField::Password => &self.password,
        }
    }

    /// Overwrite the position of one field; its label is kept
    pub fn set_position(&mut self, field: CoordinateField, x: i32, y: i32) {
        let coord = match field {
            CoordinateField::Username => &mut self.username,
            CoordinateField::Password => &mut self.password,
        };
        coord.x = x;
        coord.y = y;
    }

    pub fn to_record(&self) -> CoordinateRecord {
        CoordinateRecord {
            username_x: Some(self.username.x),
            username_y: Some(self.username.y),
            password_x: Some(self.password.x),
            password_y: Some(self.password.y),
        }
    }
}

/// Flat on-disk shape of a coordinate set.
///
/// Fields are optional on read so partially written files still load; a
/// missing value falls back to that field's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_y: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_y: Option<i32>,
}

impl From<CoordinateRecord> for LoginCoordinateSet {
    fn from(record: CoordinateRecord) -> Self {
        let (ux, uy) = DEFAULT_USERNAME;
        let (px, py) = DEFAULT_PASSWORD;
        LoginCoordinateSet::new(
            (record.username_x.unwrap_or(ux), record.username_y.unwrap_or(uy)),
            (record.password_x.unwrap_or(px), record.password_y.unwrap_or(py)),
        )
    }
}

/// Path of the record file for `name` inside `dir`
pub fn coordinates_path(dir: &Path, name: &str) -> PathBuf {
    if name.starts_with(COORDS_PREFIX) {
        dir.join(name)
    } else {
        dir.join(format!("{}{}", COORDS_PREFIX, name))
    }
}

/// Load the coordinate set stored under `name`, or the defaults if there is none
pub fn load_coordinates(dir: &Path, name: &str) -> Result<LoginCoordinateSet, AutoLoginError> {
    let path = coordinates_path(dir, name);
    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No coordinates at {}, using defaults", path.display());
            return Ok(LoginCoordinateSet::default());
        }
        Err(e) => return Err(e.into()),
    };

    let record: CoordinateRecord = serde_json::from_str(&data)?;
    Ok(record.into())
}

/// Write the coordinate set to `name` inside `dir`, creating the directory if needed
pub fn save_coordinates(
    dir: &Path,
    name: &str,
    coords: &LoginCoordinateSet,
) -> Result<PathBuf, AutoLoginError> {
    fs::create_dir_all(dir)?;
    let path = coordinates_path(dir, name);
    let json = serde_json::to_string_pretty(&coords.to_record())?;
    fs::write(&path, json)?;
    info!("Saved login coordinates to {}", path.display());
    Ok(path)
}
