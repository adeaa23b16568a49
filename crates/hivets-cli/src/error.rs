use std::path::PathBuf;

use hivets_core::line_protocol::LineProtocolError;
use hivets_datafusion::ServiceError;
use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("{source}"))]
    Service {
        #[snafu(source(from(ServiceError, Box::new)))]
        source: Box<ServiceError>,
    },

    #[snafu(display("Invalid request body: {source}"))]
    InvalidRequest { source: serde_json::Error },

    #[snafu(display("Failed to read input {}: {source}", path.as_ref().map_or("<stdin>".to_string(), |p| p.display().to_string())))]
    ReadInput {
        path: Option<PathBuf>,
        source: std::io::Error,
    },

    #[snafu(display("Invalid line protocol: {source}"))]
    LineProtocol { source: LineProtocolError },

    #[snafu(display("Failed to encode output: {source}"))]
    Encode { source: serde_json::Error },

    #[snafu(display("Failed to write output: {source}"))]
    WriteOutput { source: std::io::Error },
}
