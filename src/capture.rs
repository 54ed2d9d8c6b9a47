use crate::domain::{CameraDevice, CameraStream, FacingMode, Frame, StreamConstraints};
use crate::errors::CaptureError;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing;

/// Preferred acquisition resolution; the device may deliver its native one.
const IDEAL_WIDTH: u32 = 1920;
const IDEAL_HEIGHT: u32 = 1080;

/// An encoded still ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPhoto {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

enum CaptureState {
    Idle,
    Previewing { stream: Box<dyn CameraStream> },
    Captured { photo: CapturedPhoto },
}

/// Camera lifecycle: Idle → Previewing → Captured.
///
/// The stream handle lives inside the `Previewing` state, so every
/// transition out of it (capture, flip, cancel, an open failure, dropping
/// the controller) moves the handle out and drops it, stopping the device
/// tracks. Two handles are never held at once: re-acquisition always
/// releases the prior stream first.
pub struct CaptureController {
    device: Arc<dyn CameraDevice>,
    facing: FacingMode,
    state: CaptureState,
}

impl CaptureController {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            facing: FacingMode::Back,
            state: CaptureState::Idle,
        }
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_previewing(&self) -> bool {
        matches!(self.state, CaptureState::Previewing { .. })
    }

    /// The held still, if one has been captured and not yet consumed.
    pub fn photo(&self) -> Option<&CapturedPhoto> {
        match &self.state {
            CaptureState::Captured { photo } => Some(photo),
            _ => None,
        }
    }

    /// Opens the camera for the current facing mode and starts previewing.
    /// On device failure the controller returns to Idle.
    pub async fn open(&mut self) -> Result<(), CaptureError> {
        // Release any prior stream before acquiring.
        self.state = CaptureState::Idle;
        let constraints = StreamConstraints {
            facing: self.facing,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        };
        match self.device.open(constraints).await {
            Ok(stream) => {
                self.state = CaptureState::Previewing { stream };
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Camera acquisition failed");
                self.state = CaptureState::Idle;
                Err(e)
            }
        }
    }

    /// Toggles front/back. While previewing this re-acquires the stream,
    /// releasing the old one first.
    pub async fn flip(&mut self) -> Result<(), CaptureError> {
        self.facing = match self.facing {
            FacingMode::Front => FacingMode::Back,
            FacingMode::Back => FacingMode::Front,
        };
        if self.is_previewing() {
            self.open().await?;
        }
        Ok(())
    }

    /// Extracts the current frame as a still and releases the stream
    /// immediately; the device is not held open while the still is under
    /// review. A frame grab failure leaves the preview running for retry.
    pub fn capture(&mut self) -> Result<(), CaptureError> {
        let CaptureState::Previewing { stream } = &mut self.state else {
            return Err(CaptureError::NotPreviewing);
        };
        let frame = stream.grab_frame()?;
        let photo = encode_still(frame, self.facing)?;
        self.state = CaptureState::Captured { photo };
        Ok(())
    }

    /// Discards a held still and returns to Idle for another attempt.
    pub fn retake(&mut self) {
        self.state = CaptureState::Idle;
    }

    /// Abandons whatever is in progress, releasing any stream or still.
    pub fn cancel(&mut self) {
        self.state = CaptureState::Idle;
    }

    /// Consumes the held still, returning to Idle.
    pub fn take_photo(&mut self) -> Result<CapturedPhoto, CaptureError> {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Captured { photo } => Ok(photo),
            other => {
                self.state = other;
                Err(CaptureError::NoPhoto)
            }
        }
    }
}

/// Encodes a frame to PNG. The front sensor's preview is mirrored, so its
/// capture mirrors the draw again to keep the still right-reading; the back
/// sensor encodes as-is.
fn encode_still(frame: Frame, facing: FacingMode) -> Result<CapturedPhoto, CaptureError> {
    let raster = RgbaImage::from_raw(frame.width, frame.height, frame.rgba)
        .ok_or_else(|| CaptureError::Encode("frame buffer does not match its dimensions".into()))?;

    let raster = match facing {
        FacingMode::Front => image::imageops::flip_horizontal(&raster),
        FacingMode::Back => raster,
    };

    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(raster)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    Ok(CapturedPhoto {
        bytes: buf.into_inner(),
        content_type: "image/png",
    })
}
