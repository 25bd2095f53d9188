//! Output writer (component J).
//!
//! Mirrors the Go `output.go`'s streaming-encoder approach: write via
//! `serde_json::Serializer` directly into the file rather than building an
//! intermediate string. The store snapshot is already memory-resident (its bound
//! caps memory regardless), so this only saves the one extra string copy.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use crate::model::{Request, RequestRecord};

/// Writes `requests` as a JSON array to `path`, in the output schema documented for
/// the crawler (`method`, `url`, `headers`, `data` base64, `source`).
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be created or written, or a
/// serialization error wrapped as [`io::Error`].
pub fn write_requests(path: &Path, requests: &[Request], pretty: bool) -> io::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);

    let records: Vec<RequestRecord> = requests.iter().map(RequestRecord::from).collect();

    let result = if pretty {
        serde_json::to_writer_pretty(writer, &records)
    } else {
        serde_json::to_writer(writer, &records)
    };

    result.map_err(io::Error::from)
}
