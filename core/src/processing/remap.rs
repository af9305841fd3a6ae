use chrono::NaiveDateTime;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::config::RemapMethod;
use crate::grid::{CartesianGrid, LonLatGrid};
use crate::hybrid_scan::{PolarScan, RadarSite};
use crate::math::geo::GeoHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{
    ProcessingStage, QpeConfig, QpeError, QpeResult, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;

/// Projects polar scans onto a radar-centred Cartesian grid.
#[derive(Debug, Clone)]
pub struct CartesianRemapper {
    pub method: RemapMethod,
    /// Degrees.
    pub beam_width: f64,
    /// Metres, used by [`RemapMethod::Cressman`].
    pub cressman_radius: f64,
}

impl CartesianRemapper {
    pub fn new(method: RemapMethod, beam_width: f64, cressman_radius: f64) -> Self {
        Self {
            method,
            beam_width,
            cressman_radius,
        }
    }

    pub fn from_config(config: &QpeConfig) -> Self {
        Self::new(config.method, config.beam_width, config.cressman_radius)
    }

    /// Remaps `scan` onto the points `(xx, yy)` (metres, radar-centred, indexed `[y, x]`).
    pub fn remap(
        &self,
        scan: &PolarScan,
        xx: ArrayView2<f64>,
        yy: ArrayView2<f64>,
    ) -> QpeResult<Array2<f64>> {
        if xx.dim() != yy.dim() {
            return Err(QpeError::GridMismatch(format!(
                "x coordinates {:?} vs y coordinates {:?}",
                xx.dim(),
                yy.dim()
            )));
        }
        let (azimuth, values) = scan.sorted_by_azimuth();
        let cos_el = scan.mean_elevation().to_radians().cos();
        let ground_range = scan.range.mapv(|r| r * cos_el);

        let field = match self.method {
            RemapMethod::Nearest => nearest(
                values.view(),
                azimuth.view(),
                ground_range.view(),
                xx,
                yy,
                self.beam_width,
            ),
            RemapMethod::Sprint => sprint(
                values.view(),
                azimuth.view(),
                ground_range.view(),
                xx,
                yy,
                self.beam_width,
            ),
            RemapMethod::Cressman => {
                let (xp, yp, vp) = scatter_bins(values.view(), azimuth.view(), ground_range.view());
                let xg = xx.row(0);
                let yg = yy.column(0);
                cressman2d(
                    &xp,
                    &yp,
                    &vp,
                    xg,
                    yg,
                    self.cressman_radius,
                    self.cressman_radius,
                )
            }
        };
        Ok(field)
    }
}

/// Inverse-distance blend of two values, `(vm·dp + vp·dm) / (dm + dp)`.
fn blend(vm: f64, vp: f64, dm: f64, dp: f64) -> f64 {
    if vm == vp {
        return vm;
    }
    let total = dm + dp;
    if total == 0.0 {
        return vm;
    }
    (vm * dp + vp * dm) / total
}

/// Indices of the radials bracketing `angle` on an ascending azimuth axis, wrapping at north.
fn bracket_azimuth(azimuth: ArrayView1<f64>, angle: f64) -> (usize, usize) {
    let naz = azimuth.len();
    let flag = azimuth.iter().take_while(|&&a| a < angle).count();
    ((flag + naz - 1) % naz, flag % naz)
}

fn range_step(range: ArrayView1<f64>) -> Option<f64> {
    let diffs: Vec<f64> = range
        .iter()
        .zip(range.iter().skip(1))
        .map(|(lo, hi)| hi - lo)
        .collect();
    StatsHelper::median(&diffs).filter(|step| *step > 0.0)
}

/// Bilinear interpolation of a PPI in azimuth and range.
///
/// `values` is `[azimuth, range]` with ascending `azimuth` in degrees and ascending ground
/// `range` in metres. Cells closer than the first gate take the first gate's value.
/// Cells at or beyond the last gate, or between radials more than `2 * beam_width`
/// apart, stay NaN; a cell exactly on a radial always uses that radial.
pub fn sprint(
    values: ArrayView2<f64>,
    azimuth: ArrayView1<f64>,
    range: ArrayView1<f64>,
    xx: ArrayView2<f64>,
    yy: ArrayView2<f64>,
    beam_width: f64,
) -> Array2<f64> {
    let nrg = range.len();
    let Some(step) = range_step(range) else {
        return Array2::from_elem(xx.dim(), f64::NAN);
    };
    if azimuth.is_empty() {
        return Array2::from_elem(xx.dim(), f64::NAN);
    }
    let max_range = range[nrg - 1];

    Array2::from_shape_fn(xx.dim(), |(j, i)| {
        let (x, y) = (xx[[j, i]], yy[[j, i]]);
        let rr = x.hypot(y);
        if !(rr < max_range) {
            return f64::NAN;
        }
        let angle = GeoHelper::bearing(x, y);
        let (mut iaz_m, iaz_p) = bracket_azimuth(azimuth, angle);
        if azimuth[iaz_p] == angle {
            iaz_m = iaz_p;
        } else if (azimuth[iaz_p] - azimuth[iaz_m]).rem_euclid(360.0) > 2.0 * beam_width {
            return f64::NAN;
        }
        let daz_m = GeoHelper::angular_distance(angle - azimuth[iaz_m]);
        let daz_p = GeoHelper::angular_distance(azimuth[iaz_p] - angle);

        // inside the first gate the first gate's value holds
        if rr < range[0] {
            return blend(values[[iaz_m, 0]], values[[iaz_p, 0]], daz_m, daz_p);
        }
        let irg1 = ((rr - range[0]) / step).floor() as usize;
        let irg2 = irg1 + 1;
        if irg2 > nrg - 1 {
            return f64::NAN;
        }
        let drg_m = rr - range[irg1];
        let drg_p = range[irg2] - rr;

        blend(
            blend(values[[iaz_m, irg1]], values[[iaz_p, irg1]], daz_m, daz_p),
            blend(values[[iaz_m, irg2]], values[[iaz_p, irg2]], daz_m, daz_p),
            drg_m,
            drg_p,
        )
    })
}

/// Value of the closest `(azimuth, range)` bin; NaN beyond the last gate or when the
/// closest radial is more than one beam width away.
pub fn nearest(
    values: ArrayView2<f64>,
    azimuth: ArrayView1<f64>,
    range: ArrayView1<f64>,
    xx: ArrayView2<f64>,
    yy: ArrayView2<f64>,
    beam_width: f64,
) -> Array2<f64> {
    let nrg = range.len();
    if azimuth.is_empty() || nrg == 0 {
        return Array2::from_elem(xx.dim(), f64::NAN);
    }
    let step = range_step(range).unwrap_or(range[0]);
    let max_range = range[nrg - 1];

    Array2::from_shape_fn(xx.dim(), |(j, i)| {
        let (x, y) = (xx[[j, i]], yy[[j, i]]);
        let rr = x.hypot(y);
        if rr > max_range {
            return f64::NAN;
        }
        let angle = GeoHelper::bearing(x, y);
        let (iaz_m, iaz_p) = bracket_azimuth(azimuth, angle);
        let dm = GeoHelper::angular_distance(angle - azimuth[iaz_m]);
        let dp = GeoHelper::angular_distance(azimuth[iaz_p] - angle);
        let (iaz, distance) = if dm <= dp { (iaz_m, dm) } else { (iaz_p, dp) };
        if distance > beam_width {
            return f64::NAN;
        }
        let irg = ((rr - range[0]) / step).round().clamp(0.0, (nrg - 1) as f64) as usize;
        values[[iaz, irg]]
    })
}

/// Cartesian positions and values of every non-NaN polar bin.
fn scatter_bins(
    values: ArrayView2<f64>,
    azimuth: ArrayView1<f64>,
    range: ArrayView1<f64>,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut xp = Vec::new();
    let mut yp = Vec::new();
    let mut vp = Vec::new();
    for ((iaz, irg), &value) in values.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        let (sin, cos) = azimuth[iaz].to_radians().sin_cos();
        xp.push(sin * range[irg]);
        yp.push(cos * range[irg]);
        vp.push(value);
    }
    (xp, yp, vp)
}

/// Cressman-weighted interpolation of scattered points onto a regular grid.
///
/// Each point contributes `w = (1 - r²) / (1 + r²)` to cells with
/// `r² = ((x - xp) / x_r)² + ((y - yp) / y_r)² < 1`. Cells without contributions are NaN.
/// The result is indexed `[y, x]`.
pub fn cressman2d(
    xp: &[f64],
    yp: &[f64],
    vp: &[f64],
    xg: ArrayView1<f64>,
    yg: ArrayView1<f64>,
    x_r: f64,
    y_r: f64,
) -> Array2<f64> {
    let (nx, ny) = (xg.len(), yg.len());
    let mut weighted = Array2::<f64>::zeros((ny, nx));
    let mut weights = Array2::<f64>::zeros((ny, nx));
    if nx == 0 || ny == 0 {
        return weighted;
    }
    let dx = range_step(xg).unwrap_or(x_r);
    let dy = range_step(yg).unwrap_or(y_r);

    for ((&px, &py), &value) in xp.iter().zip(yp).zip(vp) {
        if px < xg[0] - x_r || px > xg[nx - 1] + x_r || py < yg[0] - y_r || py > yg[ny - 1] + y_r {
            continue;
        }
        let i_lo = ((px - x_r - xg[0]) / dx).floor().max(0.0) as usize;
        let i_hi = (((px + x_r - xg[0]) / dx).ceil().max(0.0) as usize).min(nx - 1);
        let j_lo = ((py - y_r - yg[0]) / dy).floor().max(0.0) as usize;
        let j_hi = (((py + y_r - yg[0]) / dy).ceil().max(0.0) as usize).min(ny - 1);

        for jj in j_lo..=j_hi {
            for ii in i_lo..=i_hi {
                let rx = (xg[ii] - px) / x_r;
                let ry = (yg[jj] - py) / y_r;
                let r2 = rx * rx + ry * ry;
                if r2 < 1.0 {
                    let w = (1.0 - r2) / (1.0 + r2);
                    weights[[jj, ii]] += w;
                    weighted[[jj, ii]] += w * value;
                }
            }
        }
    }

    ndarray::Zip::from(&mut weighted)
        .and(&weights)
        .for_each(|value, &w| {
            *value = if w > 0.0 { *value / w } else { f64::NAN };
        });
    weighted
}

/// Reflectivity of every scan of the hour on a common grid.
#[derive(Debug, Clone)]
pub struct RemappedHour {
    pub grid: CartesianGrid,
    pub geo: LonLatGrid,
    pub site: RadarSite,
    /// `[time, y, x]` reflectivity in dBZ.
    pub fields: Array3<f64>,
    pub valid_times: Vec<NaiveDateTime>,
}

/// Stage remapping all scans of the hour onto the grid of the earliest scan.
///
/// Scans are remapped in parallel on the current rayon pool.
pub struct RemapStage {
    remapper: Option<CartesianRemapper>,
    resolution: f64,
    logger: LogManager,
}

impl RemapStage {
    pub fn new() -> Self {
        Self {
            remapper: None,
            resolution: 0.0,
            logger: LogManager::new("remap"),
        }
    }
}

impl Default for RemapStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for RemapStage {
    type Input = Vec<PolarScan>;
    type Output = RemappedHour;

    fn initialize(&mut self, config: &QpeConfig) -> QpeResult<()> {
        self.remapper = Some(CartesianRemapper::from_config(config));
        self.resolution = config.grid_reso;
        Ok(())
    }

    fn execute(&mut self, mut scans: Vec<PolarScan>) -> QpeResult<StageOutput<RemappedHour>> {
        let remapper = self
            .remapper
            .as_ref()
            .ok_or_else(|| QpeError::Internal("remap stage not initialized".into()))?;
        if scans.is_empty() {
            return Err(QpeError::NoScans);
        }
        scans.sort_by_key(|scan| scan.valid_time);

        let reference = &scans[0];
        let grid = CartesianGrid::centered(reference.max_range(), self.resolution)?;
        let geo = grid.geographic(&reference.site);
        let (xx, yy) = grid.mesh();

        let remapped: Vec<Array2<f64>> = scans
            .par_iter()
            .map(|scan| remapper.remap(scan, xx.view(), yy.view()))
            .collect::<QpeResult<_>>()?;

        let views: Vec<ArrayView2<f64>> = remapped.iter().map(|field| field.view()).collect();
        let fields = ndarray::stack(Axis(0), &views)
            .map_err(|e| QpeError::GridMismatch(format!("stacking remapped scans: {e}")))?;

        let (rows, cols) = grid.shape();
        let note = format!(
            "remapped {} scans onto {}x{} grid ({:?}, {} m)",
            scans.len(),
            rows,
            cols,
            remapper.method,
            self.resolution
        );
        self.logger.record(&note);

        Ok(StageOutput::new(
            RemappedHour {
                grid,
                geo,
                site: reference.site,
                fields,
                valid_times: scans.iter().map(|scan| scan.valid_time).collect(),
            },
            StageMetadata::with_note(note),
        ))
    }

    fn cleanup(&mut self) {
        self.remapper = None;
    }
}
