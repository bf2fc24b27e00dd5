use serde::{Deserialize, Serialize};

/// Direction of the slow zoom applied to a part's still image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Even parts zoom in, odd parts zoom out
    pub fn for_part(index: usize) -> Self {
        if index % 2 == 0 {
            ZoomDirection::In
        } else {
            ZoomDirection::Out
        }
    }
}

/// Progressive zoom over the length of one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomMotion {
    pub direction: ZoomDirection,
    pub max_zoom: f64,
}

impl ZoomMotion {
    pub fn for_part(index: usize, max_zoom: f64) -> Self {
        Self {
            direction: ZoomDirection::for_part(index),
            max_zoom: max_zoom.max(1.0),
        }
    }

    /// Zoom factor expression in terms of the output frame number `on`
    pub fn zoom_expression(&self, frames: u32) -> String {
        let span = self.max_zoom - 1.0;
        let frames = frames.max(1);
        match self.direction {
            ZoomDirection::In => format!("min(1+{:.4}*on/{},{:.4})", span, frames, self.max_zoom),
            ZoomDirection::Out => format!("max({:.4}-{:.4}*on/{},1)", self.max_zoom, span, frames),
        }
    }

    /// Video filter chain that turns one still image into `frames` frames on `canvas`
    ///
    /// The image is first scaled and cropped to twice the canvas so the zoom
    /// stays smooth, then zoomed around its center.
    pub fn filter(&self, canvas: (u32, u32), frames: u32, fps: u32) -> String {
        let (width, height) = canvas;
        let (work_w, work_h) = (width * 2, height * 2);

        format!(
            "scale={ww}:{wh}:force_original_aspect_ratio=increase,crop={ww}:{wh},\
             zoompan=z='{zoom}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={frames}:s={w}x{h}:fps={fps},\
             format=yuv420p",
            ww = work_w,
            wh = work_h,
            zoom = self.zoom_expression(frames),
            frames = frames.max(1),
            w = width,
            h = height,
            fps = fps,
        )
    }
}

/// Frames needed to cover `duration` seconds (at least one)
pub fn frame_count(duration: f64, fps: u32) -> u32 {
    let frames = (duration * fps as f64).ceil();
    if frames.is_finite() && frames >= 1.0 {
        frames as u32
    } else {
        1
    }
}
