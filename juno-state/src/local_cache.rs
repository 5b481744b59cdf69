//! Holds Juno's persistent compact block cache.
//!
//! The cache holds one contiguous run of heights `[first_block, next_block)`.
//! Blocks live in memory and are mirrored to two files in the network's
//! cache directory:
//!
//! - `blocks`: for each height, a checksum followed by the prost encoded block.
//! - `index`: one fixed length [`IndexEntry`] per height, giving the block's
//!   length and hash.
//!
//! A block is written to `blocks` before its index entry, so after a crash the
//! index never points past the data. Every entry is verified on open, the
//! first bad one and everything after it are dropped.

pub(crate) mod entry;


use std::{
    fs::{self, File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use entry::{IndexEntry, StoredBlock};
use juno_fetch::chain::{block::FullBlock, utils::ParseFromSlice};
use juno_proto::proto::compact_formats::{ChainMetadata, CompactBlock, CompactOrchardAction};
use parking_lot::RwLock;
use prost::Message;
use tracing::{debug, info, warn};

use crate::{
    config::BlockCacheConfig,
    encoding::{FixedEncodedLen, JunoVersionedSerde},
    error::BlockCacheError,
};

/// File name of the block data file.
pub const BLOCKS_FILE_NAME: &str = "blocks";

/// File name of the index file.
pub const INDEX_FILE_NAME: &str = "index";

/// Suffix given to copies of damaged files.
pub const CORRUPTED_SUFFIX: &str = "-corrupted";

/// Juno's local compact block cache.
///
/// All state sits behind one lock: writers (`add`, `reorg`) take it
/// exclusively, readers see a consistent snapshot.
#[derive(Debug)]
pub struct BlockCache {
    state: RwLock<CacheState>,
    config: BlockCacheConfig,
}

#[derive(Debug)]
struct CacheState {
    /// Height of the first block held (or to be held) by the cache.
    first_block: u64,
    /// Height of the next block to be appended.
    next_block: u64,
    /// Offset in the blocks file of each held height, plus the end offset.
    starts: Vec<u64>,
    /// Hash of the block at `next_block - 1`, if any.
    latest_hash: Option<[u8; 32]>,
    /// Held blocks, `blocks[i]` is at height `first_block + i`.
    blocks: Vec<CompactBlock>,
    blocks_file: File,
    index_file: File,
}

/// Blocks recovered from disk, and where verification stopped.
struct Recovered {
    blocks: Vec<CompactBlock>,
    starts: Vec<u64>,
    failure: Option<(u64, String)>,
}

impl BlockCache {
    /// Opens the cache described by `config`, creating it if needed.
    ///
    /// Persisted blocks are verified, anything from the first damaged block
    /// onwards is dropped (and the damaged files are copied aside). Files that
    /// cannot be read at all are moved aside and the cache starts empty. With
    /// `sync_from_height` set, blocks at and above it are discarded.
    pub fn open(config: BlockCacheConfig) -> Result<Self, BlockCacheError> {
        config.check_config()?;
        let db_path = config.db_path();
        info!("Launching Local Block Cache at {}..", db_path.display());
        fs::create_dir_all(&db_path)?;

        let blocks_path = db_path.join(BLOCKS_FILE_NAME);
        let index_path = db_path.join(INDEX_FILE_NAME);
        let first_block = config.start_height;
        let capacity = config.storage.cache.capacity.unwrap_or(0);

        let (blocks_file, blocks_data, index_file, index_data) =
            match open_files(&blocks_path, &index_path) {
                Ok(files) => files,
                Err(e) => {
                    warn!(
                        "Block cache files at {} are unreadable: {e}. Starting empty at height {first_block}.",
                        db_path.display()
                    );
                    set_aside(&blocks_path);
                    set_aside(&index_path);
                    open_files(&blocks_path, &index_path)?
                }
            };
        let recovered = recover(first_block, &index_data, &blocks_data, capacity);

        if let Some((height, reason)) = &recovered.failure {
            warn!(
                "Block cache corruption at height {height}: {reason}. Keeping {} blocks.",
                recovered.blocks.len()
            );
            for path in [&blocks_path, &index_path] {
                let copy = corrupted_path(path);
                if let Err(e) = fs::copy(path, &copy) {
                    warn!("Failed to copy {} to {}: {e}", path.display(), copy.display());
                }
            }
        }

        let held = recovered.blocks.len() as u64;
        let latest_hash = recovered.blocks.last().map(block_hash).transpose()?;
        let mut state = CacheState {
            first_block,
            next_block: first_block + held,
            starts: recovered.starts,
            latest_hash,
            blocks: recovered.blocks,
            blocks_file,
            index_file,
        };
        // Drop unverified trailing data.
        state.truncate_files()?;

        if let Some(sync_from) = config.sync_from_height {
            let target = sync_from.max(state.first_block);
            if target < state.next_block {
                info!(
                    "Discarding cached blocks from height {target} (sync from height {sync_from})"
                );
                state.truncate_to(target)?;
            }
        }

        info!(
            "Block cache ready with {} blocks, heights {}..{}",
            state.blocks.len(),
            state.first_block,
            state.next_block
        );

        Ok(BlockCache {
            state: RwLock::new(state),
            config,
        })
    }

    /// Adds `block` at `height`.
    ///
    /// `height` must be in `[first, next]`. Adding below `next` first discards
    /// the held blocks from `height` upwards. The block must carry `height`,
    /// and must build on the block held at `height - 1`, if any.
    pub fn add(&self, height: u64, block: CompactBlock) -> Result<(), BlockCacheError> {
        let mut state = self.state.write();

        if height < state.first_block || height > state.next_block {
            return Err(BlockCacheError::HeightOutOfRange {
                height,
                first: state.first_block,
                next: state.next_block,
            });
        }
        if block.height != height {
            return Err(BlockCacheError::WrongHeight {
                expected: height,
                actual: block.height,
            });
        }
        let hash = block_hash(&block)?;
        let index_height = u32::try_from(height)?;
        if let Some(prev) = state.hash_at(height.checked_sub(1)) {
            if block.prev_hash != prev {
                return Err(BlockCacheError::ChainMismatch { height });
            }
        }

        if height < state.next_block {
            debug!(
                "Replacing cached blocks {height}..{}",
                state.next_block
            );
            state
                .truncate_to(height)
                .map_err(|e| BlockCacheError::Corruption {
                    height,
                    reason: format!("failed to truncate before replacing: {e}"),
                })?;
        }

        let body = block.encode_to_vec();
        let entry = IndexEntry {
            height: index_height,
            data_len: u32::try_from(body.len())?,
            hash,
        };
        let record = StoredBlock::new(height, body).to_record();
        let index_bytes = entry.to_bytes()?;

        let offset = state.end_offset();
        let index_offset = state.blocks.len() as u64 * IndexEntry::VERSIONED_LEN as u64;
        if let Err(e) = state.write_record(offset, &record, index_offset, &index_bytes) {
            // Put both files back to the last consistent length.
            if let Err(rollback) = state.truncate_files() {
                warn!("Failed to roll back block cache files: {rollback}");
            }
            return Err(BlockCacheError::Corruption {
                height,
                reason: format!("write failed: {e}"),
            });
        }

        state.starts.push(offset + record.len() as u64);
        state.blocks.push(block);
        state.next_block += 1;
        state.latest_hash = Some(hash);
        debug!("Added block {height} to cache");
        Ok(())
    }

    /// Decodes a serialized block and adds its compact form at the block's
    /// own height, returning that height.
    ///
    /// `txids` holds one wire order txid per transaction.
    pub fn add_raw_block(
        &self,
        data: &[u8],
        txids: Vec<Vec<u8>>,
        orchard_commitment_tree_size: u32,
    ) -> Result<u64, BlockCacheError> {
        let (remaining, full_block) = FullBlock::parse_from_slice(data, Some(txids), None)?;
        if !remaining.is_empty() {
            return Err(BlockCacheError::InvalidBlock(format!(
                "{} trailing bytes after block {}",
                remaining.len(),
                full_block.height()
            )));
        }
        let height = full_block.height();
        let block = full_block.into_compact(orchard_commitment_tree_size)?;
        self.add(height, block)?;
        Ok(height)
    }

    /// Discards every block at and above `height`.
    ///
    /// Heights at or below the first height empty the cache, heights at or
    /// above the next height change nothing.
    pub fn reorg(&self, height: u64) {
        let mut state = self.state.write();
        let target = height.max(state.first_block);
        if target >= state.next_block {
            return;
        }
        debug!(
            "Reorg: discarding cached blocks {}..{}",
            target, state.next_block
        );
        if let Err(e) = state.truncate_to(target) {
            warn!("Failed to truncate block cache files during reorg to {target}: {e}");
        }
    }

    /// Returns the block at `height`, if held.
    pub fn get(&self, height: u64) -> Option<CompactBlock> {
        let state = self.state.read();
        if height < state.first_block || height >= state.next_block {
            return None;
        }
        state
            .blocks
            .get((height - state.first_block) as usize)
            .cloned()
    }

    /// Returns the block at `height` holding only its Orchard nullifiers, if held.
    ///
    /// Serves wallets that only scan for spends of their notes.
    pub fn get_nullifiers(&self, height: u64) -> Option<CompactBlock> {
        self.get(height).map(compact_block_to_nullifiers)
    }

    /// Returns the height of the latest held block, or -1 if the cache is empty.
    pub fn get_latest_height(&self) -> i64 {
        let state = self.state.read();
        if state.next_block == state.first_block {
            -1
        } else {
            (state.next_block - 1) as i64
        }
    }

    /// Returns the first height held (or to be held) by the cache.
    pub fn get_first_height(&self) -> u64 {
        self.state.read().first_block
    }

    /// Returns the height the next block will be added at.
    pub fn get_next_height(&self) -> u64 {
        self.state.read().next_block
    }

    /// Returns the hash of the latest held block, in wire order.
    pub fn get_latest_hash(&self) -> Option<[u8; 32]> {
        self.state.read().latest_hash
    }

    /// Returns the number of held blocks.
    pub fn len(&self) -> usize {
        self.state.read().blocks.len()
    }

    /// Returns true if no blocks are held.
    pub fn is_empty(&self) -> bool {
        self.state.read().blocks.is_empty()
    }

    /// Returns the config the cache was opened with.
    pub fn config(&self) -> &BlockCacheConfig {
        &self.config
    }

    /// Flushes both files to disk.
    pub fn flush(&self) -> Result<(), BlockCacheError> {
        let state = self.state.read();
        state.blocks_file.sync_all()?;
        state.index_file.sync_all()?;
        Ok(())
    }

    /// Flushes and closes the cache.
    pub fn close(self) -> Result<(), BlockCacheError> {
        self.flush()?;
        let state = self.state.into_inner();
        info!(
            "Closed block cache with {} blocks, heights {}..{}",
            state.blocks.len(),
            state.first_block,
            state.next_block
        );
        Ok(())
    }
}

impl CacheState {
    /// Hash of the held block at `height`.
    fn hash_at(&self, height: Option<u64>) -> Option<&[u8]> {
        let height = height?;
        if height < self.first_block || height >= self.next_block {
            return None;
        }
        self.blocks
            .get((height - self.first_block) as usize)
            .map(|block| block.hash.as_slice())
    }

    /// Offset one past the last held record.
    fn end_offset(&self) -> u64 {
        self.starts.last().copied().unwrap_or(0)
    }

    /// Drops held blocks from `height` upwards, in memory and on disk.
    fn truncate_to(&mut self, height: u64) -> std::io::Result<()> {
        let keep = height.saturating_sub(self.first_block) as usize;
        self.blocks.truncate(keep);
        self.starts.truncate(keep + 1);
        self.next_block = self.first_block + keep as u64;
        self.latest_hash = self.blocks.last().and_then(|block| hash_array(&block.hash));
        self.truncate_files()
    }

    /// Cuts both files to the lengths implied by the held blocks.
    ///
    /// Both files are cut even if the first fails.
    fn truncate_files(&mut self) -> std::io::Result<()> {
        let index_len = self.blocks.len() as u64 * IndexEntry::VERSIONED_LEN as u64;
        let blocks_result = self.blocks_file.set_len(self.end_offset());
        let index_result = self.index_file.set_len(index_len);
        blocks_result.and(index_result)
    }

    fn write_record(
        &mut self,
        offset: u64,
        record: &[u8],
        index_offset: u64,
        index_bytes: &[u8],
    ) -> std::io::Result<()> {
        self.blocks_file.seek(SeekFrom::Start(offset))?;
        self.blocks_file.write_all(record)?;
        self.index_file.seek(SeekFrom::Start(index_offset))?;
        self.index_file.write_all(index_bytes)?;
        Ok(())
    }
}

/// Verifies persisted entries, keeping the longest valid prefix.
fn recover(first_block: u64, index_data: &[u8], blocks_data: &[u8], capacity: usize) -> Recovered {
    let entry_len = IndexEntry::VERSIONED_LEN;
    let entries = index_data.len() / entry_len;
    let mut blocks: Vec<CompactBlock> = Vec::with_capacity(capacity.max(entries));
    let mut starts = vec![0u64];
    let mut failure = None;

    for (i, raw_entry) in index_data.chunks_exact(entry_len).enumerate() {
        let height = first_block + i as u64;
        let offset = starts[i];
        match verify_entry(height, raw_entry, blocks_data, offset, blocks.last()) {
            Ok((block, record_len)) => {
                starts.push(offset + record_len);
                blocks.push(block);
            }
            Err(reason) => {
                failure = Some((height, reason));
                break;
            }
        }
    }

    if failure.is_none() && index_data.len() % entry_len != 0 {
        failure = Some((
            first_block + entries as u64,
            format!("{} trailing bytes in index", index_data.len() % entry_len),
        ));
    }

    Recovered {
        blocks,
        starts,
        failure,
    }
}

/// Checks one index entry against its record, returning the decoded block and
/// the record length.
fn verify_entry(
    height: u64,
    raw_entry: &[u8],
    blocks_data: &[u8],
    offset: u64,
    prev: Option<&CompactBlock>,
) -> Result<(CompactBlock, u64), String> {
    let entry = IndexEntry::from_bytes(raw_entry).map_err(|e| format!("bad index entry: {e}"))?;
    if u64::from(entry.height) != height {
        return Err(format!("index entry holds height {}", entry.height));
    }

    let record_len = StoredBlock::CHECKSUM_LEN as u64 + u64::from(entry.data_len);
    let start = usize::try_from(offset).map_err(|e| e.to_string())?;
    let end = usize::try_from(offset + record_len).map_err(|e| e.to_string())?;
    let record = blocks_data
        .get(start..end)
        .ok_or_else(|| "block data is truncated".to_string())?;
    let stored =
        StoredBlock::from_record(record).ok_or_else(|| "block record too short".to_string())?;
    if !stored.verify(height) {
        return Err("checksum mismatch".to_string());
    }

    let block =
        CompactBlock::decode(stored.body()).map_err(|e| format!("undecodable block: {e}"))?;
    if block.height != height {
        return Err(format!("stored block holds height {}", block.height));
    }
    if block.hash != entry.hash {
        return Err("block hash does not match index".to_string());
    }
    if let Some(prev) = prev {
        if block.prev_hash != prev.hash {
            return Err("block does not extend the previous block".to_string());
        }
    }
    Ok((block, record_len))
}

/// Opens both cache files and reads their contents.
fn open_files(
    blocks_path: &Path,
    index_path: &Path,
) -> std::io::Result<(File, Vec<u8>, File, Vec<u8>)> {
    let blocks_file = open_rw(blocks_path)?;
    let index_file = open_rw(index_path)?;
    let blocks_data = fs::read(blocks_path)?;
    let index_data = fs::read(index_path)?;
    Ok((blocks_file, blocks_data, index_file, index_data))
}

/// Moves an unreadable cache file (or whatever sits at its path) out of the way.
fn set_aside(path: &Path) {
    if fs::symlink_metadata(path).is_err() {
        return;
    }
    let target = corrupted_path(path);
    if let Ok(old) = fs::symlink_metadata(&target) {
        let removed = if old.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        if let Err(e) = removed {
            warn!("Failed to remove {}: {e}", target.display());
        }
    }
    match fs::rename(path, &target) {
        Ok(()) => warn!("Moved {} to {}", path.display(), target.display()),
        Err(e) => warn!("Failed to move {}: {e}", path.display()),
    }
}

fn open_rw(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn corrupted_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(CORRUPTED_SUFFIX);
    PathBuf::from(name)
}

fn hash_array(hash: &[u8]) -> Option<[u8; 32]> {
    <[u8; 32]>::try_from(hash).ok()
}

/// Returns the block hash as a fixed array, rejecting malformed blocks.
fn block_hash(block: &CompactBlock) -> Result<[u8; 32], BlockCacheError> {
    hash_array(&block.hash).ok_or_else(|| {
        BlockCacheError::InvalidBlock(format!(
            "block {} has a {} byte hash",
            block.height,
            block.hash.len()
        ))
    })
}

/// Strips a compact block down to its Orchard nullifiers.
///
/// The header fields are kept, everything a wallet needs only for trial
/// decryption is cleared.
pub(crate) fn compact_block_to_nullifiers(mut block: CompactBlock) -> CompactBlock {
    for tx in &mut block.vtx {
        tx.spends.clear();
        tx.outputs.clear();
        tx.actions = std::mem::take(&mut tx.actions)
            .into_iter()
            .map(|action| CompactOrchardAction {
                nullifier: action.nullifier,
                ..Default::default()
            })
            .collect();
    }
    block.chain_metadata = Some(ChainMetadata::default());
    block
}
