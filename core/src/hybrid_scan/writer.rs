use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use ndarray::Array2;

use crate::hybrid_scan::decoder::{
    ADDRESS_BYTES, LAYER_SLOTS, OBSERVATION_PREFIX_BYTES, OBSERVATION_SUFFIX_BYTES,
    PERFORMANCE_BYTES, RADIAL_HEADER_BYTES, SITE_PADDING_BYTES,
};
use crate::hybrid_scan::scan::RadarSite;
use crate::prelude::{QpeError, QpeResult};

const ZSTD_LEVEL: i32 = 3;

/// Raw content of a hybrid-scan file: header values plus the `[azimuth, gate]` byte matrix.
#[derive(Debug, Clone)]
pub struct RawHybridScan {
    pub site: RadarSite,
    pub gate_length: u16,
    pub first_gate: u16,
    pub data: Array2<u8>,
}

impl RawHybridScan {
    /// Raw byte for a reflectivity value (`b = 2 * (dBZ + 33)`), saturating at the byte range.
    pub fn encode_dbz(dbz: f64) -> u8 {
        ((dbz + 33.0) * 2.0).round().clamp(0.0, 255.0) as u8
    }
}

/// Writes `raw` in the hybrid-scan binary layout.
pub fn write_hybrid_scan<W: Write>(writer: &mut W, raw: &RawHybridScan) -> io::Result<()> {
    let (azi_num, rng_num) = raw.data.dim();
    let azi_num = u16::try_from(azi_num)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many radials"))?;
    let rng_num = u16::try_from(rng_num)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many gates"))?;

    writer.write_all(&[0u8; ADDRESS_BYTES])?;
    let lon = (raw.site.longitude * 3.6e5).round() as i32;
    let lat = (raw.site.latitude * 3.6e5).round() as i32;
    let alt = (raw.site.altitude * 1e3).round() as i32;
    for value in [lon, lat, alt] {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.write_all(&[0u8; SITE_PADDING_BYTES])?;
    writer.write_all(&[0u8; PERFORMANCE_BYTES])?;

    writer.write_all(&[0u8; OBSERVATION_PREFIX_BYTES])?;
    write_layer_table(writer, rng_num)?;
    write_layer_table(writer, azi_num)?;
    writer.write_all(&[0u8; LAYER_SLOTS * 2])?;
    write_layer_table(writer, raw.gate_length)?;
    write_layer_table(writer, raw.first_gate)?;
    writer.write_all(&[0u8; OBSERVATION_SUFFIX_BYTES])?;

    for row in raw.data.rows() {
        writer.write_all(&[0u8; RADIAL_HEADER_BYTES])?;
        let bytes: Vec<u8> = row.iter().copied().collect();
        writer.write_all(&bytes)?;
    }
    Ok(())
}

/// Writes `raw` to `path`, zstd-compressed when the extension is `.zst`.
pub fn write_file<P: AsRef<Path>>(path: P, raw: &RawHybridScan) -> QpeResult<()> {
    let path = path.as_ref();
    let to_error = |source: io::Error| QpeError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(to_error)?;
    let compressed = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zst"))
        .unwrap_or(false);

    if compressed {
        let mut encoder = zstd::stream::write::Encoder::new(file, ZSTD_LEVEL).map_err(to_error)?;
        write_hybrid_scan(&mut encoder, raw).map_err(to_error)?;
        encoder.finish().map_err(to_error)?;
    } else {
        let mut writer = BufWriter::new(file);
        write_hybrid_scan(&mut writer, raw).map_err(to_error)?;
        writer.flush().map_err(to_error)?;
    }
    Ok(())
}

/// Conventional hybrid-scan file name carrying the scan time in its fifth token.
pub fn scan_file_name(station_id: &str, valid_time: NaiveDateTime, compressed: bool) -> String {
    let suffix = if compressed { ".bin.zst" } else { ".bin" };
    format!(
        "Z_RADR_I_{}_{}_P_DOR_HSR{}",
        station_id,
        valid_time.format("%Y%m%d%H%M%S"),
        suffix
    )
}

fn write_layer_table<W: Write>(writer: &mut W, first: u16) -> io::Result<()> {
    let mut table = [0u8; LAYER_SLOTS * 2];
    table[..2].copy_from_slice(&first.to_le_bytes());
    writer.write_all(&table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_has_fixed_length() {
        let raw = RawHybridScan {
            site: RadarSite {
                longitude: 0.0,
                latitude: 0.0,
                altitude: 0.0,
            },
            gate_length: 1000,
            first_gate: 1000,
            data: Array2::zeros((2, 5)),
        };
        let mut bytes = Vec::new();
        write_hybrid_scan(&mut bytes, &raw).unwrap();
        assert_eq!(bytes.len(), 1266 + 2 * (64 + 5));
    }

    #[test]
    fn dbz_encoding_matches_decoding_rule() {
        assert_eq!(RawHybridScan::encode_dbz(20.0), 106);
        assert_eq!(RawHybridScan::encode_dbz(-33.0), 0);
        assert_eq!(RawHybridScan::encode_dbz(200.0), 255);
    }

    #[test]
    fn file_name_round_trips_time() {
        let time =
            NaiveDateTime::parse_from_str("2023-06-01 12:54:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let name = scan_file_name("Z9280", time, true);
        assert_eq!(name, "Z_RADR_I_Z9280_20230601125400_P_DOR_HSR.bin.zst");
        assert_eq!(
            crate::hybrid_scan::decoder::scan_time_from_name(&name).unwrap(),
            time
        );
    }
}
