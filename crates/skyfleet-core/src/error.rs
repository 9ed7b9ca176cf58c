use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Cannot read project file: {path}\nReason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Cannot parse project file: {path}\nReason: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Cannot load project, missing env variables:\n{}", .0.join("\n"))]
    MissingEnvVars(Vec<String>),

    #[error("Unsupported deploy provider '{0}', expected 'aws'")]
    UnsupportedProvider(String),

    #[error("Invalid project: {0}")]
    Invalid(String),

    #[error("Cannot find script(s) in {}: {}", .dir.display(), .scripts.join(","))]
    MissingScripts { dir: PathBuf, scripts: Vec<String> },

    #[error("Expected a comma-separated list of {0} or '*'")]
    EmptyPattern(String),

    #[error("No match found for {kind} '{pattern}', available definitions: {}", .available.join(","))]
    NoMatch {
        kind: String,
        pattern: String,
        available: Vec<String>,
    },

    #[error("Definition for {kind} '{name}' not found, available definitions: {}", .available.join(","))]
    UnknownName {
        kind: String,
        name: String,
        available: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, ProjectError>;
