//! GUID Partition Table.

use hal::BlockError;
use services_device_manager::{BlockCapability, PartitionType};

use super::{ParsedTable, PartitionEntry};
use crate::block_util;

pub const TABLE_NAME: &str = "gpt";

const SIGNATURE: &[u8; 8] = b"EFI PART";
const HEADER_LBA: u64 = 1;
const MIN_ENTRY_SIZE: usize = 128;
const MAX_ENTRIES: usize = 128;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// Decodes one entry. Entries that are unused, inverted or reach past the
/// end of a disk of `disk_sectors` come back empty.
fn parse_entry(raw: &[u8], disk_sectors: u64) -> PartitionEntry {
    let mut guid = [0u8; 16];
    guid.copy_from_slice(&raw[..16]);
    let first = read_u64(raw, 32);
    let last = read_u64(raw, 40);
    let sectors = if guid == [0u8; 16] || last < first || last >= disk_sectors {
        0
    } else {
        (last - first + 1).min(u32::MAX as u64) as u32
    };
    PartitionEntry {
        lba: first,
        sectors,
        kind: PartitionType::Gpt(guid),
    }
}

/// Parses the GPT header at LBA 1 and its entry array.
///
/// Trailing unused entries are dropped, so the partition count is the
/// index of the last used entry plus one.
pub fn parse(disk: &dyn BlockCapability) -> Result<Option<ParsedTable>, BlockError> {
    if disk.total_sectors() as u64 <= HEADER_LBA {
        return Ok(None);
    }
    let mut header = [0u8; 512];
    block_util::read_sectors(disk, HEADER_LBA, &mut header)?;
    if &header[..8] != SIGNATURE {
        return Ok(None);
    }

    let sector_size = disk.sector_size() as usize;
    let disk_sectors = disk.total_sectors() as u64;
    let entries_lba = read_u64(&header, 72);
    let entry_count = (read_u32(&header, 80) as usize).min(MAX_ENTRIES);
    let entry_size = read_u32(&header, 84) as usize;
    if entry_size < MIN_ENTRY_SIZE || entry_size % MIN_ENTRY_SIZE != 0 || entry_size > sector_size {
        return Ok(None);
    }
    let array_len = entry_count * entry_size;
    let array_sectors = array_len.div_ceil(sector_size) as u64;
    let in_bounds = entries_lba
        .checked_add(array_sectors)
        .is_some_and(|end| entries_lba > HEADER_LBA && end <= disk_sectors);
    if !in_bounds {
        return Ok(None);
    }

    let mut array = vec![0u8; array_len];
    block_util::read_bytes(disk, entries_lba * sector_size as u64, &mut array)?;

    let mut entries: Vec<PartitionEntry> = array
        .chunks_exact(entry_size)
        .map(|raw| parse_entry(raw, disk_sectors))
        .collect();
    while entries.last().is_some_and(PartitionEntry::is_empty) {
        entries.pop();
    }
    Ok(Some(ParsedTable::new(TABLE_NAME, entries)))
}
