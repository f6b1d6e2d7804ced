//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (SWERVE_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "$SWERVE_SW_ROOT/params" directory
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    // Get the params dir
    let mut path = crate::host::get_swerve_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    // Load the file into a string
    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    load_str(&params_str)
}

/// Parse parameters from a string holding the contents of a parameter file.
pub fn load_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}
