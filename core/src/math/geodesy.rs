//! Spherical and spheroidal geometry on (lat, lon) positions in radians.
//!
//! Exact distances are in kilometres, the fast estimate and every filter
//! threshold built on it are in nautical miles. Degrees only appear in
//! [`GeoPosition::from_degrees`] and [`GeoPosition::to_degrees`].

use crate::math::matrix::MatrixHelper;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

pub const FEET_PER_METER: f64 = 1.0 / 0.3048;
pub const KM_PER_NM: f64 = 1.852;
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257_223_563;
pub const EARTH_EQUATORIAL_RADIUS_KM: f64 = 6_378.137;

/// Legs longer than this use a finite-difference window for their bearing.
const TRACK_WINDOW_MIN_NM: f64 = 4.0;
const TRACK_WINDOW_HALF_NM: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPosition {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn from_degrees(lat_deg: f64, lon_deg: f64) -> Self {
        Self {
            lat: lat_deg.to_radians(),
            lon: lon_deg.to_radians(),
        }
    }

    /// `(lat, lon)` in degrees.
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lat.to_degrees(), self.lon.to_degrees())
    }

    fn to_cartesian(self) -> [f64; 3] {
        let (sin_lat, cos_lat) = self.lat.sin_cos();
        let (sin_lon, cos_lon) = self.lon.sin_cos();
        [-cos_lat * sin_lon, cos_lat * cos_lon, sin_lat]
    }

    fn from_cartesian(v: [f64; 3]) -> Self {
        Self {
            lat: v[2].atan2(v[0].hypot(v[1])),
            lon: (-v[0]).atan2(v[1]),
        }
    }
}

/// Distance on the WGS84 spheroid in kilometres (Meeus, two-term correction).
pub fn great_circle_distance(a: GeoPosition, b: GeoPosition) -> f64 {
    if a == b {
        return 0.0;
    }
    let f = (a.lat + b.lat) / 2.0;
    let g = (a.lat - b.lat) / 2.0;
    let l = (a.lon - b.lon) / 2.0;
    let (sin_f, cos_f) = f.sin_cos();
    let (sin_g, cos_g) = g.sin_cos();
    let (sin_l, cos_l) = l.sin_cos();

    let s = sin_g.powi(2) * cos_l.powi(2) + cos_f.powi(2) * sin_l.powi(2);
    let c = cos_g.powi(2) * cos_l.powi(2) + sin_f.powi(2) * sin_l.powi(2);
    if s == 0.0 {
        return 0.0;
    }
    let w = (s / c).sqrt().atan();
    let d = 2.0 * w * EARTH_EQUATORIAL_RADIUS_KM;
    let t = (s * c).sqrt() / w;
    let h1 = (3.0 * t - 1.0) / (2.0 * c);
    let h2 = (3.0 * t + 1.0) / (2.0 * s);

    d * (1.0 + EARTH_FLATTENING * h1 * sin_f.powi(2) * cos_g.powi(2)
        - EARTH_FLATTENING * h2 * cos_f.powi(2) * sin_g.powi(2))
}

/// Equirectangular distance estimate in nautical miles.
pub fn great_circle_distance_estimate(a: GeoPosition, b: GeoPosition) -> f64 {
    let d_lat = (b.lat - a.lat).to_degrees();
    let d_lon = (b.lon - a.lon).to_degrees() * ((a.lat + b.lat) / 2.0).cos();
    60.0 * d_lat.hypot(d_lon)
}

/// Point at fraction `t` of the great-circle arc from `a` to `b`.
pub fn interpolate_on_great_circle(a: GeoPosition, b: GeoPosition, t: f64) -> GeoPosition {
    ArcInterpolator::new(a, b).at(t)
}

/// Precomputed arc between two positions.
///
/// The arc is rotated so that `a` lies on the Z axis and `b` in the YZ plane;
/// evaluating a fraction is then a single matrix-vector product.
#[derive(Debug, Clone)]
pub struct ArcInterpolator {
    origin: GeoPosition,
    arc_angle: f64,
    turn: f64,
    back_rotation: Option<Array2<f64>>,
}

impl ArcInterpolator {
    pub fn new(a: GeoPosition, b: GeoPosition) -> Self {
        if a == b {
            return Self {
                origin: a,
                arc_angle: 0.0,
                turn: 1.0,
                back_rotation: None,
            };
        }

        let va = a.to_cartesian();
        let angle_z = va[0].atan2(va[1]);
        let to_yz = MatrixHelper::rotation_z(-angle_z);
        let va_yz = MatrixHelper::apply(to_yz.view(), va);
        let angle_x = va_yz[1].atan2(va_yz[2]);
        let to_pole =
            MatrixHelper::multiply(MatrixHelper::rotation_x(-angle_x).view(), to_yz.view());

        let vb = MatrixHelper::apply(to_pole.view(), b.to_cartesian());
        let angle_bz = vb[0].atan2(vb[1]);
        let vb_yz = MatrixHelper::apply(MatrixHelper::rotation_z(-angle_bz).view(), vb);
        let arc_angle = vb_yz[1].abs().atan2(vb_yz[2]);
        let turn = if vb_yz[1] < 0.0 { -1.0 } else { 1.0 };

        let back_rotation = MatrixHelper::multiply(
            MatrixHelper::multiply(
                MatrixHelper::rotation_z(angle_z).view(),
                MatrixHelper::rotation_x(angle_x).view(),
            )
            .view(),
            MatrixHelper::rotation_z(angle_bz).view(),
        );

        Self {
            origin: a,
            arc_angle,
            turn,
            back_rotation: Some(back_rotation),
        }
    }

    /// Central angle of the arc in radians.
    pub fn arc_angle(&self) -> f64 {
        self.arc_angle
    }

    pub fn at(&self, t: f64) -> GeoPosition {
        let Some(back_rotation) = self.back_rotation.as_ref() else {
            return self.origin;
        };
        let (sin, cos) = (self.arc_angle * t).sin_cos();
        let point = MatrixHelper::apply(back_rotation.view(), [0.0, self.turn * sin, cos]);
        GeoPosition::from_cartesian(point)
    }
}

/// Projection of `p` onto the great circle through `a` and `b`.
pub fn nearest_point_on_great_circle(
    p: GeoPosition,
    a: GeoPosition,
    b: GeoPosition,
) -> GeoPosition {
    if a == b {
        return p;
    }
    let normal = cross(a.to_cartesian(), b.to_cartesian());
    let norm_sq = dot(normal, normal);
    if norm_sq == 0.0 {
        return p;
    }
    let vp = p.to_cartesian();
    let k = dot(vp, normal) / norm_sq;
    GeoPosition::from_cartesian([
        vp[0] - k * normal[0],
        vp[1] - k * normal[1],
        vp[2] - k * normal[2],
    ])
}

/// Bearing in `[0, 2π)` of the arc `a`→`b` at fraction `t`.
pub fn track_angle(a: GeoPosition, b: GeoPosition, t: f64) -> f64 {
    let distance = great_circle_distance_estimate(a, b);
    let (from, to) = if distance > TRACK_WINDOW_MIN_NM {
        let delta = TRACK_WINDOW_HALF_NM / distance;
        let arc = ArcInterpolator::new(a, b);
        let from = if t - delta > 0.0 { arc.at(t - delta) } else { a };
        let to = if t + delta < 1.0 { arc.at(t + delta) } else { b };
        (from, to)
    } else {
        (a, b)
    };
    local_bearing(from, to)
}

/// Signed bearing change at `b` between the legs `a`→`b` and `b`→`c`, in `(-π, π]`.
pub fn track_angle_change(a: GeoPosition, b: GeoPosition, c: GeoPosition) -> f64 {
    let change = track_angle(b, c, 0.0) - track_angle(a, b, 1.0);
    let wrapped = (change + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

fn local_bearing(from: GeoPosition, to: GeoPosition) -> f64 {
    let d_lat = to.lat - from.lat;
    let d_lon = (to.lon - from.lon) * ((from.lat + to.lat) / 2.0).cos();
    let bearing = d_lon.atan2(d_lat).rem_euclid(TAU);
    if bearing >= TAU {
        0.0
    } else {
        bearing
    }
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
