use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, info};
use tx_core::block::{Block, Epoc, EventType, Snip};

use crate::DataError;

/// File holding epoc events of an exported block
pub const EPOCS_FILE: &str = "epocs.csv";
/// File holding snippet events of an exported block
pub const SNIPS_FILE: &str = "snips.csv";

#[derive(Debug, Deserialize)]
struct EpocRow {
    name: String,
    onset: f64,
    offset: f64,
    data: f64,
}

#[derive(Debug, Deserialize)]
struct SnipRow {
    name: String,
    channel: u16,
    ts: f64,
}

/// Block data source backed by a directory of exported CSV tables
pub struct BlockSource {
    /// Path to the block directory
    path: PathBuf,
    /// Block name (directory name)
    name: String,
}

impl BlockSource {
    /// Create a new block source from a directory path
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, DataError> {
        let path = path.into();
        if !path.is_dir() {
            return Err(DataError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("block directory {} does not exist", path.display()),
            )));
        }
        let name = block_name(&path);
        Ok(Self { path, name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the block synchronously
    pub fn read(&self, event_types: &[EventType]) -> Result<Block, DataError> {
        read_block(&self.path, event_types)
    }
}

fn block_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Read the requested event families of the block exported under `dir`
pub fn read_block(dir: &Path, event_types: &[EventType]) -> Result<Block, DataError> {
    let mut block = Block::new(block_name(dir));

    if event_types.contains(&EventType::Epocs) {
        for epoc in read_epocs(&dir.join(EPOCS_FILE))? {
            block.insert_epoc(epoc);
        }
    }
    if event_types.contains(&EventType::Snips) {
        for snip in read_snips(&dir.join(SNIPS_FILE))? {
            block.insert_snip(snip);
        }
    }

    info!(
        "Loaded block {} ({} epoc stores, {} snip stores)",
        block.name,
        block.epocs.len(),
        block.snips.len()
    );
    Ok(block)
}

/// Read all epoc stores from an exported epocs table
pub fn read_epocs(path: &Path) -> Result<Vec<Epoc>, DataError> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let mut stores: AHashMap<String, Epoc> = AHashMap::new();
    for result in reader.deserialize::<EpocRow>() {
        let row = result?;
        stores
            .entry(row.name.clone())
            .or_insert_with(|| Epoc::new(row.name.clone()))
            .push(row.onset, row.offset, row.data);
    }

    let mut epocs: Vec<Epoc> = stores.into_values().collect();
    for epoc in &mut epocs {
        epoc.sort();
        debug!("Epoc store {}: {} events", epoc.name, epoc.len());
    }
    epocs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(epocs)
}

/// Read all snippet stores from an exported snips table
pub fn read_snips(path: &Path) -> Result<Vec<Snip>, DataError> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(BufReader::new(file));

    let mut stores: AHashMap<String, Snip> = AHashMap::new();
    for result in reader.deserialize::<SnipRow>() {
        let row = result?;
        stores
            .entry(row.name.clone())
            .or_insert_with(|| Snip::new(row.name.clone()))
            .push(row.ts, row.channel);
    }

    let mut snips: Vec<Snip> = stores.into_values().collect();
    for snip in &mut snips {
        snip.sort();
        debug!("Snip store {}: {} events", snip.name, snip.len());
    }
    snips.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(snips)
}

#[async_trait]
impl tx_core::data::RecordingSource for BlockSource {
    async fn load(&self, event_types: &[EventType]) -> anyhow::Result<Block> {
        let epocs = event_types.contains(&EventType::Epocs).then(|| {
            let path = self.path.join(EPOCS_FILE);
            tokio::task::spawn_blocking(move || read_epocs(&path))
        });
        let snips = event_types.contains(&EventType::Snips).then(|| {
            let path = self.path.join(SNIPS_FILE);
            tokio::task::spawn_blocking(move || read_snips(&path))
        });

        let mut block = Block::new(self.name.clone());
        if let Some(task) = epocs {
            for epoc in task.await.map_err(DataError::from)?? {
                block.insert_epoc(epoc);
            }
        }
        if let Some(task) = snips {
            for snip in task.await.map_err(DataError::from)?? {
                block.insert_snip(snip);
            }
        }

        info!(
            "Loaded block {} ({} epoc stores, {} snip stores)",
            block.name,
            block.epocs.len(),
            block.snips.len()
        );
        Ok(block)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tx_core::data::RecordingSource;

    fn write_block(dir: &Path) {
        std::fs::write(
            dir.join(EPOCS_FILE),
            "name,onset,offset,data\nTriS,20.0,50.0,2\nTriS,10.0,40.0,1\nAttn, 10.5, 10.75, 30\n",
        )
        .unwrap();
        std::fs::write(
            dir.join(SNIPS_FILE),
            "name,channel,ts\nCSPK,2,10.6\nCSPK,1,10.55\n",
        )
        .unwrap();
    }

    #[test]
    fn test_reads_and_sorts_stores() {
        let dir = tempfile::tempdir().unwrap();
        write_block(dir.path());

        let block = read_block(dir.path(), &EventType::ALL).unwrap();
        let trials = block.epoc("TriS").unwrap();
        assert_eq!(trials.onset, vec![10.0, 20.0]);
        assert_eq!(trials.data, vec![1.0, 2.0]);
        assert_eq!(block.epoc("Attn").unwrap().data, vec![30.0]);

        let spikes = block.snip("CSPK").unwrap();
        assert_eq!(spikes.ts, vec![10.55, 10.6]);
        assert_eq!(spikes.chan, vec![1, 2]);
    }

    #[test]
    fn test_only_requested_event_types_are_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(EPOCS_FILE), "name,onset,offset,data\nTriS,1,2,1\n").unwrap();

        let block = read_block(dir.path(), &[EventType::Epocs]).unwrap();
        assert!(block.snips.is_empty());
        assert!(read_block(dir.path(), &[EventType::Snips]).is_err());
    }

    #[test]
    fn test_malformed_rows_are_csv_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(EPOCS_FILE),
            "name,onset,offset,data\nTriS,soon,2,1\n",
        )
        .unwrap();

        match read_block(dir.path(), &[EventType::Epocs]) {
            Err(DataError::Csv(message)) => assert!(message.contains("line: 2"), "{}", message),
            other => panic!("expected CSV error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BlockSource::new(dir.path().join("nope")).is_err());
    }

    #[tokio::test]
    async fn test_async_load_matches_sync_read() {
        let dir = tempfile::tempdir().unwrap();
        write_block(dir.path());
        let source = BlockSource::new(dir.path()).unwrap();

        let loaded = source.load(&EventType::ALL).await.unwrap();
        let read = source.read(&EventType::ALL).unwrap();
        assert_eq!(loaded.epoc("TriS").unwrap(), read.epoc("TriS").unwrap());
        assert_eq!(loaded.snip("CSPK").unwrap(), read.snip("CSPK").unwrap());
        assert_eq!(source.source_name(), read.name);
    }
}
