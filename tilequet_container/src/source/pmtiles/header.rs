use anyhow::{Result, bail};
use byteorder::{LittleEndian as LE, ReadBytesExt};
use std::io::Cursor;
use tilequet_core::{TileFormat, TileQuetError};

pub const HEADER_LENGTH: u64 = 127;

/// A section of the archive, or an entry inside a section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteRange {
	pub offset: u64,
	pub length: u64,
}

impl ByteRange {
	pub fn new(offset: u64, length: u64) -> ByteRange {
		ByteRange { offset, length }
	}

	/// Turns a range relative to `section` into an absolute one.
	pub fn within(&self, section: &ByteRange) -> ByteRange {
		ByteRange::new(section.offset + self.offset, self.length)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PMTilesCompression {
	Unknown = 0x0,
	None = 0x1,
	Gzip = 0x2,
	Brotli = 0x3,
	Zstd = 0x4,
}

impl PMTilesCompression {
	pub fn from_u8(value: u8) -> Result<PMTilesCompression> {
		Ok(match value {
			0 => PMTilesCompression::Unknown,
			1 => PMTilesCompression::None,
			2 => PMTilesCompression::Gzip,
			3 => PMTilesCompression::Brotli,
			4 => PMTilesCompression::Zstd,
			_ => bail!(TileQuetError::Malformed(format!("unknown PMTiles compression {value}"))),
		})
	}
}

#[derive(Debug, PartialEq)]
pub struct Header {
	pub root_dir: ByteRange,
	pub metadata: ByteRange,
	pub leaf_dirs: ByteRange,
	pub tile_data: ByteRange,
	pub addressed_tiles_count: u64,
	pub tile_entries_count: u64,
	pub tile_contents_count: u64,
	pub clustered: bool,
	pub internal_compression: PMTilesCompression,
	pub tile_compression: PMTilesCompression,
	pub tile_type: u8,
	pub min_zoom: u8,
	pub max_zoom: u8,
	pub min_lon_e7: i32,
	pub min_lat_e7: i32,
	pub max_lon_e7: i32,
	pub max_lat_e7: i32,
	pub center_zoom: u8,
	pub center_lon_e7: i32,
	pub center_lat_e7: i32,
}

impl Header {
	pub fn deserialize(buffer: &[u8]) -> Result<Header> {
		if buffer.len() as u64 != HEADER_LENGTH || &buffer[0..7] != b"PMTiles" {
			bail!(TileQuetError::Malformed(String::from("not a PMTiles archive")));
		}
		if buffer[7] != 3 {
			bail!(TileQuetError::Malformed(format!(
				"PMTiles version {} is not supported, expected 3",
				buffer[7]
			)));
		}

		let mut reader = Cursor::new(&buffer[8..]);
		let mut range = || -> Result<ByteRange> { Ok(ByteRange::new(reader.read_u64::<LE>()?, reader.read_u64::<LE>()?)) };
		let root_dir = range()?;
		let metadata = range()?;
		let leaf_dirs = range()?;
		let tile_data = range()?;

		Ok(Header {
			root_dir,
			metadata,
			leaf_dirs,
			tile_data,
			addressed_tiles_count: reader.read_u64::<LE>()?,
			tile_entries_count: reader.read_u64::<LE>()?,
			tile_contents_count: reader.read_u64::<LE>()?,
			clustered: reader.read_u8()? == 1,
			internal_compression: PMTilesCompression::from_u8(reader.read_u8()?)?,
			tile_compression: PMTilesCompression::from_u8(reader.read_u8()?)?,
			tile_type: reader.read_u8()?,
			min_zoom: reader.read_u8()?,
			max_zoom: reader.read_u8()?,
			min_lon_e7: reader.read_i32::<LE>()?,
			min_lat_e7: reader.read_i32::<LE>()?,
			max_lon_e7: reader.read_i32::<LE>()?,
			max_lat_e7: reader.read_i32::<LE>()?,
			center_zoom: reader.read_u8()?,
			center_lon_e7: reader.read_i32::<LE>()?,
			center_lat_e7: reader.read_i32::<LE>()?,
		})
	}

	/// The payload format named by the `tile_type` byte, `None` for 0 (unknown) and
	/// values this reader does not know.
	pub fn tile_format(&self) -> Option<TileFormat> {
		match self.tile_type {
			1 => Some(TileFormat::Pbf),
			2 => Some(TileFormat::Png),
			3 => Some(TileFormat::Jpeg),
			4 => Some(TileFormat::Webp),
			5 => Some(TileFormat::Avif),
			_ => None,
		}
	}

	pub fn bounds(&self) -> [f64; 4] {
		[
			f64::from(self.min_lon_e7) / 1e7,
			f64::from(self.min_lat_e7) / 1e7,
			f64::from(self.max_lon_e7) / 1e7,
			f64::from(self.max_lat_e7) / 1e7,
		]
	}

	pub fn center(&self) -> [f64; 3] {
		[
			f64::from(self.center_lon_e7) / 1e7,
			f64::from(self.center_lat_e7) / 1e7,
			f64::from(self.center_zoom),
		]
	}

	#[cfg(test)]
	pub fn serialize(&self) -> Vec<u8> {
		use byteorder::WriteBytesExt;

		let mut buffer = b"PMTiles\x03".to_vec();
		for range in [self.root_dir, self.metadata, self.leaf_dirs, self.tile_data] {
			buffer.write_u64::<LE>(range.offset).unwrap();
			buffer.write_u64::<LE>(range.length).unwrap();
		}
		for count in [
			self.addressed_tiles_count,
			self.tile_entries_count,
			self.tile_contents_count,
		] {
			buffer.write_u64::<LE>(count).unwrap();
		}
		buffer.extend([
			u8::from(self.clustered),
			self.internal_compression as u8,
			self.tile_compression as u8,
			self.tile_type,
			self.min_zoom,
			self.max_zoom,
		]);
		for value in [self.min_lon_e7, self.min_lat_e7, self.max_lon_e7, self.max_lat_e7] {
			buffer.write_i32::<LE>(value).unwrap();
		}
		buffer.push(self.center_zoom);
		buffer.write_i32::<LE>(self.center_lon_e7).unwrap();
		buffer.write_i32::<LE>(self.center_lat_e7).unwrap();
		buffer
	}
}

#[cfg(test)]
pub fn example_header() -> Header {
	Header {
		root_dir: ByteRange::new(127, 20),
		metadata: ByteRange::new(147, 30),
		leaf_dirs: ByteRange::new(177, 0),
		tile_data: ByteRange::new(177, 400),
		addressed_tiles_count: 5,
		tile_entries_count: 5,
		tile_contents_count: 5,
		clustered: true,
		internal_compression: PMTilesCompression::Gzip,
		tile_compression: PMTilesCompression::None,
		tile_type: 2,
		min_zoom: 0,
		max_zoom: 1,
		min_lon_e7: -1_800_000_000,
		min_lat_e7: -850_511_287,
		max_lon_e7: 1_800_000_000,
		max_lat_e7: 850_511_287,
		center_zoom: 1,
		center_lon_e7: 134_000_000,
		center_lat_e7: 525_000_000,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn header_round_trip() {
		let header = example_header();
		let bytes = header.serialize();
		assert_eq!(bytes.len() as u64, HEADER_LENGTH);
		assert_eq!(Header::deserialize(&bytes).unwrap(), header);
	}

	#[test]
	fn derived_values() {
		let header = example_header();
		assert_eq!(header.tile_format(), Some(TileFormat::Png));
		assert_eq!(header.bounds(), [-180.0, -85.0511287, 180.0, 85.0511287]);
		assert_eq!(header.center(), [13.4, 52.5, 1.0]);
		assert_eq!(
			ByteRange::new(10, 5).within(&header.tile_data),
			ByteRange::new(187, 5)
		);
	}

	#[test]
	fn rejects_other_files() {
		let mut bytes = example_header().serialize();
		bytes[7] = 2;
		let err = Header::deserialize(&bytes).unwrap_err();
		assert!(err.to_string().contains("PMTiles version 2"));

		let err = Header::deserialize(b"SQLite format 3\0").unwrap_err();
		assert!(matches!(
			TileQuetError::classify(&err),
			Some(TileQuetError::Malformed(_))
		));
	}
}
