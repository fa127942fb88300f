// src/geometry.rs
// Screen-relative region mappings and DPI coordinate conversion

use serde::{Deserialize, Serialize};

/// Absolute rectangle in physical screenshot pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Point expressed as fractions (0.0-1.0) of a window region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelPoint {
    pub x: f64,
    pub y: f64,
}

/// Logical (scaled) coordinates as reported by windowing APIs on high-DPI
/// displays.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogicalCoordinates {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Physical pixel coordinates as used by screenshot capture.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PhysicalCoordinates {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where one game window lives on screen, stored as fractions of the full
/// display so the mapping survives resolution changes, plus the in-region
/// anchor points the bet placer clicks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMapping {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// One anchor per stake denomination, lowest first.
    pub stake_buttons: Vec<RelPoint>,
    pub red_button: RelPoint,
    pub orange_button: RelPoint,
    pub confirm_button: RelPoint,
}

impl RegionMapping {
    /// Resolve the stored fractions against the actual display size,
    /// clamped so the rect never exceeds the screen.
    pub fn to_pixel_rect(&self, screen_width: u32, screen_height: u32) -> PixelRect {
        let x = (self.x * screen_width as f64) as u32;
        let y = (self.y * screen_height as f64) as u32;
        let w = (self.width * screen_width as f64) as u32;
        let h = (self.height * screen_height as f64) as u32;

        let x = x.min(screen_width.saturating_sub(1));
        let y = y.min(screen_height.saturating_sub(1));
        PixelRect {
            x,
            y,
            width: w.min(screen_width - x),
            height: h.min(screen_height - y),
        }
    }

    /// Absolute click point for an anchor expressed relative to this region.
    pub fn resolve_point(
        &self,
        point: RelPoint,
        screen_width: u32,
        screen_height: u32,
    ) -> (i32, i32) {
        let rect = self.to_pixel_rect(screen_width, screen_height);
        let px = rect.x as f64 + point.x * rect.width as f64;
        let py = rect.y as f64 + point.y * rect.height as f64;
        (px.round() as i32, py.round() as i32)
    }
}

/// Convert logical window coordinates to physical screen coordinates.
/// Logical coords are what windowing APIs return (e.g. 2880x1856 on
/// high-DPI); physical coords are what screenshot capture uses.
pub fn logical_to_physical(
    logical: &LogicalCoordinates,
    scale_factor: f64,
) -> PhysicalCoordinates {
    PhysicalCoordinates {
        x: (logical.x.max(0) as f64 * scale_factor).round() as u32,
        y: (logical.y.max(0) as f64 * scale_factor).round() as u32,
        width: (logical.width as f64 * scale_factor).round() as u32,
        height: (logical.height as f64 * scale_factor).round() as u32,
    }
}

/// Convert physical screen coordinates back to logical coordinates.
pub fn physical_to_logical(
    physical: &PhysicalCoordinates,
    scale_factor: f64,
) -> LogicalCoordinates {
    LogicalCoordinates {
        x: (physical.x as f64 / scale_factor).round() as i32,
        y: (physical.y as f64 / scale_factor).round() as i32,
        width: (physical.width as f64 / scale_factor).round() as u32,
        height: (physical.height as f64 / scale_factor).round() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mapping() -> RegionMapping {
        RegionMapping {
            x: 0.0,
            y: 0.0,
            width: 0.5,
            height: 1.0,
            stake_buttons: vec![RelPoint { x: 0.1, y: 0.9 }],
            red_button: RelPoint { x: 0.3, y: 0.8 },
            orange_button: RelPoint { x: 0.7, y: 0.8 },
            confirm_button: RelPoint { x: 0.5, y: 0.95 },
        }
    }

    #[test]
    fn rect_resolves_against_screen_size() {
        let rect = test_mapping().to_pixel_rect(1920, 1080);
        assert_eq!(rect, PixelRect { x: 0, y: 0, width: 960, height: 1080 });
    }

    #[test]
    fn rect_clamped_to_screen_bounds() {
        let mapping = RegionMapping {
            x: 0.9,
            y: 0.9,
            width: 0.5,
            height: 0.5,
            ..test_mapping()
        };
        let rect = mapping.to_pixel_rect(1000, 1000);
        assert!(rect.x + rect.width <= 1000);
        assert!(rect.y + rect.height <= 1000);
    }

    #[test]
    fn point_resolves_inside_region() {
        let (x, y) = test_mapping().resolve_point(RelPoint { x: 0.5, y: 0.5 }, 1920, 1080);
        assert_eq!((x, y), (480, 540));
    }

    #[test]
    fn logical_physical_round_trip() {
        let logical = LogicalCoordinates { x: 100, y: 60, width: 640, height: 480 };
        let physical = logical_to_physical(&logical, 2.0);
        assert_eq!(physical.x, 200);
        assert_eq!(physical.width, 1280);

        let back = physical_to_logical(&physical, 2.0);
        assert_eq!(back.x, logical.x);
        assert_eq!(back.width, logical.width);
    }
}
