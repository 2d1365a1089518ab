use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {}", .source)]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("XML error: {}", .source)]
    Xml {
        #[from]
        source: roxmltree::Error,
    },
    #[error("NML2 error: {}", .what)]
    Nml { what: String },
    #[error("LEMS error: {}", .what)]
    Lems { what: String },
    #[error("Simulator error: {}", .what)]
    Sim { what: String },
    #[error("Data error: {}", .what)]
    Data { what: String },
    #[error("Detection error: {}", .what)]
    Detect { what: String },
    #[error("Plot error: {}", .what)]
    Plot { what: String },
    #[error("Parse error: {}", .what)]
    Parse { what: String },
}

pub fn nml2_error<T: Into<String>>(what: T) -> Error {
    Error::Nml { what: what.into() }
}
