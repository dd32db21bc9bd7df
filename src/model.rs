//! Data models shared by every backend
//!
//! - Backend identification and platform detection results
//! - Rectangles in global virtual-desktop coordinates
//! - Window snapshots returned by enumeration

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Represents the display backend bound for the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// No native protocol; best-effort capture only
    Generic,
    /// X11 display server (XCB + MIT-SHM)
    X11,
    /// wlroots-style Wayland compositor (wlr-screencopy)
    Wayland,
}

impl BackendType {
    /// Returns the backend type as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Generic => "generic",
            BackendType::X11 => "x11",
            BackendType::Wayland => "wayland",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(BackendType::Generic),
            "x11" => Ok(BackendType::X11),
            "wayland" => Ok(BackendType::Wayland),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Platform information including OS and the bound display backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Operating system name (e.g., "linux")
    pub os:      String,
    /// Bound display backend
    pub backend: BackendType,
}

impl PlatformInfo {
    /// Creates a new PlatformInfo instance
    pub fn new(os: String, backend: BackendType) -> Self {
        Self { os, backend }
    }
}

/// Axis-aligned rectangle in global virtual-desktop pixels
///
/// The origin may be negative (monitors left of or above the primary one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Geometry {
    /// Left edge
    pub x:      i32,
    /// Top edge
    pub y:      i32,
    /// Width in pixels
    pub width:  u32,
    /// Height in pixels
    pub height: u32,
}

impl Geometry {
    /// Creates a new rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns true when the rectangle covers no pixel
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Smallest rectangle containing both; empty operands are ignored
    pub fn union(&self, other: &Geometry) -> Geometry {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }

        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        Geometry {
            x,
            y,
            width: clamp_extent(right - i64::from(x)),
            height: clamp_extent(bottom - i64::from(y)),
        }
    }

    /// Returns true when the two rectangles share at least one pixel
    pub fn intersects(&self, other: &Geometry) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && i64::from(self.x) < other.right()
            && i64::from(other.x) < self.right()
            && i64::from(self.y) < other.bottom()
            && i64::from(other.y) < self.bottom()
    }

    /// Union of all rectangles, `None` when the iterator is empty
    pub fn bounding<'a>(rects: impl IntoIterator<Item = &'a Geometry>) -> Option<Geometry> {
        rects.into_iter().fold(None, |acc, g| match acc {
            None => Some(*g),
            Some(a) => Some(a.union(g)),
        })
    }
}

fn clamp_extent(v: i64) -> u32 {
    v.clamp(0, i64::from(u32::MAX)) as u32
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}{:+}{:+}", self.width, self.height, self.x, self.y)
    }
}

/// Parses `X,Y,WxH` (the CLI's `--geometry` syntax).
impl FromStr for Geometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(',').collect();
        let [x, y, size] = parts.as_slice() else {
            return Err(format!("expected X,Y,WxH, got '{s}'"));
        };
        let (w, h) = size
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WxH, got '{size}'"))?;

        let num = |v: &str, what: &str| -> Result<i64, String> {
            v.trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid {what} '{v}': {e}"))
        };

        let x = i32::try_from(num(x, "x")?).map_err(|e| e.to_string())?;
        let y = i32::try_from(num(y, "y")?).map_err(|e| e.to_string())?;
        let width = u32::try_from(num(w, "width")?).map_err(|e| e.to_string())?;
        let height = u32::try_from(num(h, "height")?).map_err(|e| e.to_string())?;

        Ok(Geometry::new(x, y, width, height))
    }
}

/// Pixel offset, used for cursor hotspots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal offset
    pub x: i32,
    /// Vertical offset
    pub y: i32,
}

impl Point {
    /// Creates a new point
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Snapshot of one selectable top-level window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenWindowInfo {
    /// Bounds in root coordinates
    pub geometry: Geometry,
    /// `WM_NAME`, lossily decoded
    pub name:     String,
}

impl OpenWindowInfo {
    /// Creates a new window snapshot
    pub fn new(geometry: Geometry, name: impl Into<String>) -> Self {
        Self {
            geometry,
            name: name.into(),
        }
    }
}

impl fmt::Display for OpenWindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Win({} {})", self.name, self.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_serialization() {
        assert_eq!(serde_json::to_string(&BackendType::Generic).unwrap(), r#""generic""#);
        assert_eq!(serde_json::to_string(&BackendType::Wayland).unwrap(), r#""wayland""#);
        assert_eq!(serde_json::to_string(&BackendType::X11).unwrap(), r#""x11""#);
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("X11".parse::<BackendType>().unwrap(), BackendType::X11);
        assert_eq!(" wayland ".parse::<BackendType>().unwrap(), BackendType::Wayland);
        assert_eq!("generic".parse::<BackendType>().unwrap(), BackendType::Generic);
        assert!("windows".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_backend_type_display() {
        assert_eq!(format!("{}", BackendType::Generic), "generic");
        assert_eq!(format!("{}", BackendType::X11), "x11");
    }

    #[test]
    fn test_platform_info_serialization() {
        let info = PlatformInfo::new("linux".to_string(), BackendType::Wayland);
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains(r#""os":"linux""#));
        assert!(json.contains(r#""backend":"wayland""#));
    }

    #[test]
    fn test_geometry_union_side_by_side() {
        let left = Geometry::new(0, 0, 1920, 1080);
        let right = Geometry::new(1920, 0, 2560, 1440);

        assert_eq!(left.union(&right), Geometry::new(0, 0, 4480, 1440));
    }

    #[test]
    fn test_geometry_union_negative_origin() {
        let primary = Geometry::new(0, 0, 100, 100);
        let above_left = Geometry::new(-50, -20, 40, 40);

        assert_eq!(primary.union(&above_left), Geometry::new(-50, -20, 150, 120));
    }

    #[test]
    fn test_geometry_union_ignores_empty() {
        let g = Geometry::new(10, 10, 5, 5);
        assert_eq!(g.union(&Geometry::default()), g);
        assert_eq!(Geometry::default().union(&g), g);
    }

    #[test]
    fn test_geometry_bounding() {
        let rects = [Geometry::new(0, 0, 10, 10), Geometry::new(20, 5, 10, 10)];
        assert_eq!(Geometry::bounding(&rects), Some(Geometry::new(0, 0, 30, 15)));
        assert_eq!(Geometry::bounding(&[]), None);
    }

    #[test]
    fn test_geometry_intersects() {
        let a = Geometry::new(0, 0, 10, 10);
        assert!(a.intersects(&Geometry::new(9, 9, 5, 5)));
        assert!(!a.intersects(&Geometry::new(10, 0, 5, 5)));
        assert!(!a.intersects(&Geometry::new(2, 2, 0, 5)));
    }

    #[test]
    fn test_geometry_display() {
        assert_eq!(Geometry::new(0, 0, 1920, 1080).to_string(), "1920x1080+0+0");
        assert_eq!(Geometry::new(-10, 20, 5, 5).to_string(), "5x5-10+20");
    }

    #[test]
    fn test_geometry_parse() {
        assert_eq!("0,0,1920x1080".parse::<Geometry>().unwrap(), Geometry::new(0, 0, 1920, 1080));
        assert_eq!("-100, 50, 10X20".parse::<Geometry>().unwrap(), Geometry::new(-100, 50, 10, 20));
        assert!("1920x1080".parse::<Geometry>().is_err());
        assert!("0,0,-5x10".parse::<Geometry>().is_err());
        assert!("0,0,10by10".parse::<Geometry>().is_err());
    }

    #[test]
    fn test_open_window_info_display() {
        let win = OpenWindowInfo::new(Geometry::new(10, 20, 300, 200), "Terminal");
        assert_eq!(win.to_string(), "Win(Terminal 300x200+10+20)");
    }
}
