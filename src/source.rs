//! Newline-delimited JSON block source.

use std::path::Path;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;

use crate::types::block::IndexerBlock;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid block on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Read blocks from `path`, or stdin when `None`, into `tx`.
pub async fn read_blocks_from(path: Option<&Path>, tx: Sender<IndexerBlock>) -> Result<usize, SourceError> {
    match path {
        Some(path) => {
            tracing::info!("Reading blocks from {}", path.display());
            let file = tokio::fs::File::open(path).await?;
            read_blocks(BufReader::new(file), tx).await
        }
        None => {
            tracing::info!("Reading blocks from stdin");
            read_blocks(BufReader::new(tokio::io::stdin()), tx).await
        }
    }
}

/// Parse one block per non-empty line and send it downstream. Stops early,
/// without error, once the receiver is gone. Returns the number of blocks
/// sent.
pub async fn read_blocks<R>(reader: R, tx: Sender<IndexerBlock>) -> Result<usize, SourceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_number = 0;
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let block: IndexerBlock = serde_json::from_str(&line).map_err(|source| SourceError::Parse {
            line: line_number,
            source,
        })?;

        if tx.send(block).await.is_err() {
            tracing::debug!("Block receiver closed after {} blocks", sent);
            break;
        }
        sent += 1;
    }

    Ok(sent)
}
