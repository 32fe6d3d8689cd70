//! Reanalysis fields consumed along the trajectories
//!
//! Decoding the archive (GRIB) is the job of an external reader. It hands
//! over a `RawReanalysis` with the decoded arrays; `ReanalysisField::from_raw`
//! derives what the detrainment engine needs: an ascending latitude axis,
//! grid origin and spacing, model-level pressure, dry density and the
//! detrainment rate per unit mass.

use chrono::NaiveDateTime;
use std::fmt;

use crate::core_types::ReanalysisKind;
use crate::grid::Cell;

/// Gas constant of dry air (J kg⁻¹ K⁻¹)
pub const R_DRY: f64 = 287.04;

/// Errors preparing a reanalysis field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// No field archived for the requested time
    Missing { valid: NaiveDateTime, reason: String },
    /// An optional auxiliary product is not available for this time
    Unavailable { var: &'static str, valid: NaiveDateTime },
    /// Array sizes disagree with the grid
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A retained model level has no hybrid coefficients
    Level(i64),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing { valid, reason } => {
                write!(f, "no reanalysis field at {valid}: {reason}")
            }
            FieldError::Unavailable { var, valid } => {
                write!(f, "{var} unavailable at {valid}")
            }
            FieldError::Shape {
                what,
                expected,
                found,
            } => write!(f, "{what} has {found} values, expected {expected}"),
            FieldError::Level(lev) => write!(f, "no hybrid coefficients for level {lev}"),
        }
    }
}

impl std::error::Error for FieldError {}

fn check_shape(what: &'static str, expected: usize, found: usize) -> Result<(), FieldError> {
    if expected == found {
        Ok(())
    } else {
        Err(FieldError::Shape {
            what,
            expected,
            found,
        })
    }
}

/// Decoded reanalysis arrays for one validity time
///
/// 3D arrays are level-major (`level, lat, lon`). Latitudes may be stored in
/// either order.
#[derive(Debug, Clone)]
pub struct RawReanalysis {
    pub valid: NaiveDateTime,
    pub lons: Vec<f64>,
    pub lats: Vec<f64>,
    /// 1-based model level numbers of the retained levels
    pub levs: Vec<i64>,
    /// Half-level hybrid coefficients (Pa)
    pub ai: Vec<f64>,
    /// Half-level hybrid coefficients (dimensionless)
    pub bi: Vec<f64>,
    /// Surface pressure (Pa)
    pub surface_pressure: Vec<f64>,
    /// Temperature on model levels (K)
    pub temperature: Vec<f64>,
    /// Updraught detrainment rate (kg m⁻³ s⁻¹); `None` when the diabatic
    /// product is not archived for this time
    pub detrainment: Option<Vec<f64>>,
}

/// Read-only view of the fields used by one time slice
#[derive(Debug, Clone)]
pub struct ReanalysisField {
    valid: NaiveDateTime,
    nlat: usize,
    nlon: usize,
    levs: Vec<i64>,
    lo1: f64,
    la1: f64,
    dlo: f64,
    dla: f64,
    neg_log_sp: Vec<f64>,
    /// Detrainment rate per unit mass (s⁻¹), level-major
    detrainment: Vec<f64>,
}

impl ReanalysisField {
    /// Derive the accessor view from decoded arrays
    ///
    /// # Errors
    /// `FieldError::Unavailable` when the detrainment product is missing,
    /// `FieldError::Shape` or `FieldError::Level` for inconsistent input
    pub fn from_raw(raw: RawReanalysis) -> Result<Self, FieldError> {
        let RawReanalysis {
            valid,
            lons,
            mut lats,
            levs,
            ai,
            bi,
            mut surface_pressure,
            mut temperature,
            detrainment,
        } = raw;
        let mut detrainment = detrainment.ok_or(FieldError::Unavailable { var: "UDR", valid })?;

        let (nlat, nlon, nlev) = (lats.len(), lons.len(), levs.len());
        if nlat < 2 || nlon < 2 {
            return Err(FieldError::Shape {
                what: "grid axes",
                expected: 2,
                found: nlat.min(nlon),
            });
        }
        let plane = nlat * nlon;
        check_shape("surface pressure", plane, surface_pressure.len())?;
        check_shape("temperature", nlev * plane, temperature.len())?;
        check_shape("detrainment", nlev * plane, detrainment.len())?;
        check_shape("hybrid b", ai.len(), bi.len())?;

        if lats[0] > lats[nlat - 1] {
            lats.reverse();
            flip_rows(&mut surface_pressure, nlat, nlon);
            for k in 0..nlev {
                flip_rows(&mut temperature[k * plane..(k + 1) * plane], nlat, nlon);
                flip_rows(&mut detrainment[k * plane..(k + 1) * plane], nlat, nlon);
            }
        }

        let mut lo1 = lons[0];
        let lo2 = lons[nlon - 1];
        if lo1 > lo2 {
            lo1 -= 360.0;
        }
        let dlo = (lo2 - lo1) / (nlon - 1) as f64;
        let dla = (lats[nlat - 1] - lats[0]) / (nlat - 1) as f64;

        // Full-level coefficients are the mean of the bounding half levels
        for (k, &lev) in levs.iter().enumerate() {
            let l = usize::try_from(lev - 1).map_err(|_| FieldError::Level(lev))?;
            if l + 1 >= ai.len() {
                return Err(FieldError::Level(lev));
            }
            let am = 0.5 * (ai[l] + ai[l + 1]);
            let bm = 0.5 * (bi[l] + bi[l + 1]);
            let offset = k * plane;
            for cell in 0..plane {
                let p = am + bm * surface_pressure[cell];
                let rho = p / (R_DRY * temperature[offset + cell]);
                detrainment[offset + cell] /= rho;
            }
        }

        Ok(Self {
            valid,
            nlat,
            nlon,
            levs,
            lo1,
            la1: lats[0],
            dlo,
            dla,
            neg_log_sp: surface_pressure.iter().map(|sp| -sp.ln()).collect(),
            detrainment,
        })
    }

    pub fn valid(&self) -> NaiveDateTime {
        self.valid
    }

    /// (nlev, nlat, nlon)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.levs.len(), self.nlat, self.nlon)
    }

    /// Model level number of the first retained level
    pub fn first_level(&self) -> i64 {
        self.levs.first().copied().unwrap_or(1)
    }

    /// (lo1, la1, dlo, dla)
    pub fn geometry(&self) -> (f64, f64, f64, f64) {
        (self.lo1, self.la1, self.dlo, self.dla)
    }

    /// Nearest grid cell of a position, clamped into the grid
    #[inline]
    pub fn cell_of(&self, x: f64, y: f64) -> Cell {
        let col = ((x - self.lo1) / self.dlo + 0.5).floor() as i64;
        let row = ((y - self.la1) / self.dla + 0.5).floor() as i64;
        (
            col.clamp(0, self.nlon as i64 - 1),
            row.clamp(0, self.nlat as i64 - 1),
        )
    }

    /// Detrainment rate per unit mass (s⁻¹) at a retained level and cell
    ///
    /// `None` when the level is not retained.
    #[inline]
    pub fn detrainment_at(&self, level: i64, cell: Cell) -> Option<f64> {
        let k = usize::try_from(level).ok().filter(|&k| k < self.levs.len())?;
        let (col, row) = (cell.0 as usize, cell.1 as usize);
        self.detrainment
            .get(k * self.nlat * self.nlon + row * self.nlon + col)
            .copied()
    }

    /// Bilinear interpolation of −log(surface pressure)
    ///
    /// NaN outside the grid.
    pub fn neg_log_surface_pressure(&self, lat: f64, lon: f64) -> f64 {
        let fy = (lat - self.la1) / self.dla;
        let fx = (lon - self.lo1) / self.dlo;
        let (ymax, xmax) = ((self.nlat - 1) as f64, (self.nlon - 1) as f64);
        if !(0.0..=ymax).contains(&fy) || !(0.0..=xmax).contains(&fx) {
            return f64::NAN;
        }
        let j0 = (fy.floor() as usize).min(self.nlat - 2);
        let i0 = (fx.floor() as usize).min(self.nlon - 2);
        let (wy, wx) = (fy - j0 as f64, fx - i0 as f64);
        let at = |j: usize, i: usize| self.neg_log_sp[j * self.nlon + i];
        let south = at(j0, i0) * (1.0 - wx) + at(j0, i0 + 1) * wx;
        let north = at(j0 + 1, i0) * (1.0 - wx) + at(j0 + 1, i0 + 1) * wx;
        south * (1.0 - wy) + north * wy
    }
}

fn flip_rows<T>(values: &mut [T], nlat: usize, nlon: usize) {
    for j in 0..nlat / 2 {
        let (top, bottom) = values.split_at_mut((nlat - 1 - j) * nlon);
        top[j * nlon..(j + 1) * nlon].swap_with_slice(&mut bottom[..nlon]);
    }
}

/// Source of reanalysis fields keyed by validity time
pub trait ReanalysisProvider {
    /// Reanalysis this provider serves
    fn kind(&self) -> ReanalysisKind;

    /// Field valid over the hour following `valid`
    ///
    /// # Errors
    /// Returns a `FieldError` when the field cannot be produced; the run aborts.
    fn field(&mut self, valid: NaiveDateTime) -> Result<ReanalysisField, FieldError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 8, 31)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    /// 3 lats (north to south) x 2 lons, one retained level
    fn raw() -> RawReanalysis {
        RawReanalysis {
            valid: date(),
            lons: vec![10.0, 11.0],
            lats: vec![2.0, 1.0, 0.0],
            levs: vec![2],
            ai: vec![0.0, 1000.0, 2000.0],
            bi: vec![0.0, 0.0, 0.5],
            surface_pressure: vec![100000.0, 100000.0, 90000.0, 90000.0, 80000.0, 80000.0],
            temperature: vec![250.0; 6],
            detrainment: Some(vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]),
        }
    }

    #[test]
    fn test_latitudes_reordered() {
        let field = ReanalysisField::from_raw(raw()).unwrap();
        let (lo1, la1, dlo, dla) = field.geometry();
        assert_eq!((lo1, la1, dlo, dla), (10.0, 0.0, 1.0, 1.0));
        // southern row was last, now first
        let rate = field.detrainment_at(0, (0, 0)).unwrap();
        let p = 1500.0 + 0.25 * 80000.0;
        assert_relative_eq!(rate, 3.0 * R_DRY * 250.0 / p, max_relative = 1e-12);
    }

    #[test]
    fn test_missing_detrainment_is_unavailable() {
        let mut input = raw();
        input.detrainment = None;
        assert!(matches!(
            ReanalysisField::from_raw(input),
            Err(FieldError::Unavailable { var: "UDR", .. })
        ));
    }

    #[test]
    fn test_level_without_coefficients() {
        let mut input = raw();
        input.levs = vec![3];
        assert_eq!(ReanalysisField::from_raw(input).unwrap_err(), FieldError::Level(3));
    }

    #[test]
    fn test_longitude_wrap() {
        let mut input = raw();
        input.lons = vec![359.0, 0.0];
        let field = ReanalysisField::from_raw(input).unwrap();
        let (lo1, _, dlo, _) = field.geometry();
        assert_eq!(lo1, -1.0);
        assert_eq!(dlo, 1.0);
    }

    #[test]
    fn test_surface_pressure_interpolation() {
        let field = ReanalysisField::from_raw(raw()).unwrap();
        assert_relative_eq!(field.neg_log_surface_pressure(0.0, 10.0), -(80000.0f64).ln());
        let mid = field.neg_log_surface_pressure(0.5, 10.5);
        assert_relative_eq!(mid, -0.5 * ((80000.0f64).ln() + (90000.0f64).ln()));
        assert!(field.neg_log_surface_pressure(3.0, 10.0).is_nan());
    }

    #[test]
    fn test_cell_of_rounds_to_nearest() {
        let field = ReanalysisField::from_raw(raw()).unwrap();
        assert_eq!(field.cell_of(10.49, 1.51), (0, 2));
        assert_eq!(field.cell_of(50.0, -4.0), (1, 0));
        assert_eq!(field.detrainment_at(1, (0, 0)), None);
    }
}
