//! WAL Reader
//!
//! Replays a segment during engine open. A torn tail (partial length
//! prefix, declared length past EOF, or a body that does not decode) is
//! discarded and the file is truncated back to the last intact record so
//! the next append starts from a clean boundary.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::codec::Record;
use crate::error::Result;

/// Result of replaying one WAL segment
pub struct WalReplay {
    /// Intact records in append order, with their framed byte lengths
    pub records: Vec<(Record, usize)>,

    /// Whether a torn tail was discarded and the file truncated
    pub truncated: bool,
}

/// Replay a segment file, truncating any torn tail in place
pub fn replay(path: &Path) -> Result<WalReplay> {
    let data = fs::read(path)?;
    let mut records = Vec::new();
    let mut pos = 0usize;
    let mut truncated = false;

    while pos < data.len() {
        let mut slice = &data[pos..];
        match Record::decode(&mut slice) {
            Ok(record) => {
                let consumed = data.len() - pos - slice.len();
                records.push((record, consumed));
                pos += consumed;
            }
            Err(_) => {
                warn!(
                    path = %path.display(),
                    offset = pos,
                    "discarding torn WAL tail"
                );
                let file = fs::OpenOptions::new().write(true).open(path)?;
                file.set_len(pos as u64)?;
                file.sync_all()?;
                truncated = true;
                break;
            }
        }
    }

    Ok(WalReplay { records, truncated })
}
