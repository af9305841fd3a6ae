use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use chrono::NaiveDateTime;
use ndarray::{Array1, Array2};

use crate::hybrid_scan::scan::{PolarScan, RadarSite};
use crate::prelude::{QpeError, QpeResult};

pub(crate) const ADDRESS_BYTES: usize = 142;
pub(crate) const SITE_PADDING_BYTES: usize = 6;
pub(crate) const PERFORMANCE_BYTES: usize = 40;
pub(crate) const OBSERVATION_PREFIX_BYTES: usize = 446;
/// Per-layer tables hold 30 `u16` slots.
pub(crate) const LAYER_SLOTS: usize = 30;
pub(crate) const OBSERVATION_SUFFIX_BYTES: usize = 320;
pub(crate) const RADIAL_HEADER_BYTES: usize = 64;

/// Elevation assigned to every radial of a hybrid-scan composite.
pub const HYBRID_ELEVATION_DEG: f64 = 0.5;
/// Raw byte marking "no echo"; it decodes to -33 dBZ.
pub const NO_ECHO_RAW: u8 = 0;

const SCAN_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Decodes a hybrid-scan file, transparently decompressing `.zst` files.
pub fn decode_file<P: AsRef<Path>>(path: P) -> QpeResult<PolarScan> {
    let path = path.as_ref();
    let valid_time = scan_time_from_name(path)?;
    let file = File::open(path).map_err(|source| QpeError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_zstd = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zst"))
        .unwrap_or(false);
    if is_zstd {
        let decoder = zstd::stream::read::Decoder::new(file).map_err(|source| QpeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        decode_reader(decoder, valid_time)
    } else {
        decode_reader(BufReader::new(file), valid_time)
    }
}

/// Decodes a hybrid-scan byte stream.
pub fn decode_reader<R: Read>(reader: R, valid_time: NaiveDateTime) -> QpeResult<PolarScan> {
    let mut reader = ScanReader { inner: reader };

    reader.skip(ADDRESS_BYTES, "address block")?;
    let lon = reader.read_i32("site longitude")?;
    let lat = reader.read_i32("site latitude")?;
    let alt = reader.read_i32("site altitude")?;
    let site = RadarSite {
        longitude: lon as f64 / 3.6 / 1e5,
        latitude: lat as f64 / 3.6 / 1e5,
        altitude: alt as f64 / 1e3,
    };
    reader.skip(SITE_PADDING_BYTES, "site block")?;
    reader.skip(PERFORMANCE_BYTES, "performance parameters")?;

    reader.skip(OBSERVATION_PREFIX_BYTES, "observation parameters")?;
    let rng_num = reader.read_first_slot("gate counts")? as usize;
    let azi_num = reader.read_first_slot("radial counts")? as usize;
    reader.skip(LAYER_SLOTS * 2, "observation parameters")?;
    let gate_length = reader.read_first_slot("gate lengths")? as f64;
    let first_gate = reader.read_first_slot("first gate ranges")? as f64;
    reader.skip(OBSERVATION_SUFFIX_BYTES, "observation padding")?;

    if rng_num == 0 || azi_num == 0 {
        return Err(QpeError::InvalidScan(format!(
            "{azi_num} radials of {rng_num} gates"
        )));
    }
    if gate_length <= 0.0 {
        return Err(QpeError::InvalidScan("zero gate length".into()));
    }

    // Header counts are untrusted; the array grows only as radials are actually read.
    let mut values: Vec<f64> = Vec::new();
    let mut radial = vec![0u8; rng_num];
    for _ in 0..azi_num {
        reader.skip(RADIAL_HEADER_BYTES, "radial header")?;
        reader.read_bytes(&mut radial, "radial data")?;
        values.extend(radial.iter().map(|&raw| {
            if raw == NO_ECHO_RAW {
                f64::NAN
            } else {
                raw as f64 / 2.0 - 33.0
            }
        }));
    }
    let reflectivity = Array2::from_shape_vec((azi_num, rng_num), values)
        .map_err(|e| QpeError::InvalidScan(format!("radial data: {e}")))?;

    let azimuth = Array1::from_iter((0..azi_num).map(|i| i as f64 * (360.0 / azi_num as f64)));
    let elevation = Array1::from_elem(azi_num, HYBRID_ELEVATION_DEG);
    let range = Array1::from_iter((0..rng_num).map(|k| (k + 1) as f64 * gate_length));

    let mut scan = PolarScan::new(reflectivity, azimuth, range, elevation, site, valid_time)?;
    scan.first_gate = first_gate;
    log::debug!(
        "decoded hybrid scan {} ({} radials x {} gates)",
        valid_time,
        azi_num,
        rng_num
    );
    Ok(scan)
}

/// Extracts the scan time from the fifth `_`-separated token of a file name,
/// e.g. `Z_RADR_I_Z9280_20230601120600_P_DOR_HSR.bin`.
pub fn scan_time_from_name<P: AsRef<Path>>(path: P) -> QpeResult<NaiveDateTime> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| QpeError::FileName(path.display().to_string()))?;

    name.split('_')
        .nth(4)
        .and_then(|token| token.get(..14))
        .and_then(|stamp| NaiveDateTime::parse_from_str(stamp, SCAN_TIME_FORMAT).ok())
        .ok_or_else(|| QpeError::FileName(name.to_string()))
}

struct ScanReader<R> {
    inner: R,
}

impl<R: Read> ScanReader<R> {
    fn read_bytes(&mut self, buf: &mut [u8], section: &'static str) -> QpeResult<()> {
        self.inner.read_exact(buf).map_err(|e| truncated(e, section))
    }

    fn skip(&mut self, count: usize, section: &'static str) -> QpeResult<()> {
        let copied = io::copy(&mut (&mut self.inner).take(count as u64), &mut io::sink())
            .map_err(|e| truncated(e, section))?;
        if copied as usize != count {
            return Err(QpeError::Truncated { section });
        }
        Ok(())
    }

    fn read_i32(&mut self, section: &'static str) -> QpeResult<i32> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf, section)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads a 30-slot `u16` layer table and keeps slot 0; a hybrid scan has one layer.
    fn read_first_slot(&mut self, section: &'static str) -> QpeResult<u16> {
        let mut buf = [0u8; LAYER_SLOTS * 2];
        self.read_bytes(&mut buf, section)?;
        Ok(u16::from_le_bytes([buf[0], buf[1]]))
    }
}

fn truncated(error: io::Error, section: &'static str) -> QpeError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        QpeError::Truncated { section }
    } else {
        QpeError::Internal(format!("reading {section}: {error}"))
    }
}
