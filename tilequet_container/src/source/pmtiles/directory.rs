use super::header::ByteRange;
use anyhow::{Result, bail};
use byteorder::ReadBytesExt;
use std::io::Cursor;
use tilequet_core::TileQuetError;

/// One directory entry: a run of `run_length` tiles sharing the same data, or, with
/// `run_length = 0`, a pointer into the leaf directory section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
	pub tile_id: u64,
	pub run_length: u32,
	pub range: ByteRange,
}

impl Entry {
	pub fn is_leaf(&self) -> bool {
		self.run_length == 0
	}
}

/// Decodes an uncompressed directory: the entry count, then the delta-coded tile
/// ids, run lengths, lengths and offsets, each as a column of varints.
pub fn parse_entries(data: &[u8]) -> Result<Vec<Entry>> {
	let mut reader = Cursor::new(data);
	let num_entries = read_varint(&mut reader)?;
	if num_entries > data.len() as u64 {
		bail!(TileQuetError::Malformed(format!(
			"directory of {} bytes claims {num_entries} entries",
			data.len()
		)));
	}

	let mut entries = Vec::with_capacity(num_entries as usize);
	let mut tile_id = 0u64;
	for _ in 0..num_entries {
		tile_id = tile_id
			.checked_add(read_varint(&mut reader)?)
			.ok_or_else(|| TileQuetError::Malformed(String::from("tile id overflows")))?;
		entries.push(Entry {
			tile_id,
			run_length: 0,
			range: ByteRange::default(),
		});
	}
	for entry in &mut entries {
		entry.run_length = u32::try_from(read_varint(&mut reader)?)
			.map_err(|_| TileQuetError::Malformed(String::from("run length exceeds 32 bits")))?;
	}
	for entry in &mut entries {
		entry.range.length = read_varint(&mut reader)?;
	}
	for index in 0..entries.len() {
		let value = read_varint(&mut reader)?;
		entries[index].range.offset = if index > 0 && value == 0 {
			let previous = entries[index - 1].range;
			previous.offset + previous.length
		} else {
			match value.checked_sub(1) {
				Some(offset) => offset,
				None => bail!(TileQuetError::Malformed(String::from(
					"the first directory entry has no offset"
				))),
			}
		};
	}
	Ok(entries)
}

fn read_varint(reader: &mut Cursor<&[u8]>) -> Result<u64> {
	let mut value = 0;
	let mut shift = 0;
	loop {
		let byte = match reader.read_u8() {
			Ok(byte) => byte,
			Err(_) => bail!(TileQuetError::Malformed(String::from("directory ends inside a varint"))),
		};
		value |= (u64::from(byte) & 0x7F) << shift;
		if byte & 0x80 == 0 {
			break;
		}
		shift += 7;
		if shift >= 64 {
			bail!(TileQuetError::Malformed(String::from("varint too long")));
		}
	}
	Ok(value)
}

/// Encodes entries the way [`parse_entries`] reads them, offsets always explicit.
#[cfg(test)]
pub fn serialize_entries(entries: &[Entry]) -> Vec<u8> {
	fn write_varint(buffer: &mut Vec<u8>, mut value: u64) {
		while value >= 0x80 {
			buffer.push((value as u8) | 0x80);
			value >>= 7;
		}
		buffer.push(value as u8);
	}

	let mut buffer = Vec::new();
	write_varint(&mut buffer, entries.len() as u64);
	let mut previous = 0;
	for entry in entries {
		write_varint(&mut buffer, entry.tile_id - previous);
		previous = entry.tile_id;
	}
	for entry in entries {
		write_varint(&mut buffer, u64::from(entry.run_length));
	}
	for entry in entries {
		write_varint(&mut buffer, entry.range.length);
	}
	for entry in entries {
		write_varint(&mut buffer, entry.range.offset + 1);
	}
	buffer
}
