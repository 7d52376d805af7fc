use crate::error::Error;
use crate::events::{Frame, LoadTicket, LoaderEvent};
use crate::processing::layout::{CanvasSize, fit_within};
use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::RgbaImage;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Decode `path` and fit it into `canvas`, preserving the aspect ratio.
pub fn decode_frame(path: &Path, canvas: CanvasSize) -> Result<Frame> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()? // sniff based on content/extension
        .decode()?
        .to_rgba8();
    let img = apply_orientation(img, read_orientation(path).unwrap_or(1));

    let (w, h) = fit_within(canvas, img.width(), img.height());
    let img = resize_rgba(&img, w, h)
        .with_context(|| format!("failed to resize {}", path.display()))?;

    Ok(Frame {
        source: path.to_path_buf(),
        image: Arc::new(img),
    })
}

// Unsupported orientations fall through as-is.
fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    use image::imageops::{flip_horizontal, flip_vertical, rotate90, rotate180, rotate270};
    match orientation {
        2 => flip_horizontal(&img),
        3 => rotate180(&img),
        4 => flip_vertical(&img),
        5 => flip_horizontal(&rotate90(&img)),
        6 => rotate90(&img),
        7 => flip_horizontal(&rotate270(&img)),
        8 => rotate270(&img),
        _ => img,
    }
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!("exif orientation {} for {}", o, path.display());
    Some(o)
}

fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for frame resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options =
        fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("frame resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))
}

/// Decodes the frames of one effect at a time on behalf of the session.
///
/// Only one load is tracked. Asking for the effect that is already loading
/// is rejected; asking for a different one cancels the outstanding load and
/// makes its ticket stale.
pub struct FrameLoader {
    canvas: CanvasSize,
    events: Sender<LoaderEvent>,
    active: Option<ActiveLoad>,
    next_id: u64,
}

struct ActiveLoad {
    ticket: LoadTicket,
    cancel: CancellationToken,
}

impl FrameLoader {
    pub fn new(canvas: CanvasSize, events: Sender<LoaderEvent>) -> Self {
        Self {
            canvas,
            events,
            active: None,
            next_id: 0,
        }
    }

    /// Start decoding `files` for `effect`. Must be called inside a tokio
    /// runtime.
    pub fn start(&mut self, effect: &Path, files: Vec<PathBuf>) -> Result<LoadTicket, Error> {
        if let Some(active) = self.active.take() {
            if active.ticket.effect == effect {
                self.active = Some(active);
                return Err(Error::LoaderBusy(effect.to_path_buf()));
            }
            info!(
                superseded = %active.ticket.effect.display(),
                "cancelling outstanding frame load"
            );
            active.cancel.cancel();
        }

        self.next_id += 1;
        let ticket = LoadTicket {
            id: self.next_id,
            effect: effect.to_path_buf(),
        };
        let cancel = CancellationToken::new();
        tokio::spawn(load_frames(
            ticket.clone(),
            files,
            self.canvas,
            self.events.clone(),
            cancel.clone(),
        ));
        self.active = Some(ActiveLoad {
            ticket: ticket.clone(),
            cancel,
        });
        Ok(ticket)
    }

    /// Whether events carrying `ticket` belong to the current load.
    pub fn accepts(&self, ticket: &LoadTicket) -> bool {
        self.active.as_ref().is_some_and(|a| a.ticket == *ticket)
    }

    /// Retire the current load if `ticket` is it. Returns whether it was.
    pub fn complete(&mut self, ticket: &LoadTicket) -> bool {
        if self.accepts(ticket) {
            self.active = None;
            true
        } else {
            debug!(effect = %ticket.effect.display(), id = ticket.id, "dropping stale load result");
            false
        }
    }

    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(effect = %active.ticket.effect.display(), "frame load cancelled");
            active.cancel.cancel();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&LoadTicket> {
        self.active.as_ref().map(|a| &a.ticket)
    }
}

/// Decode `files` in order, one at a time, yielding between frames.
///
/// A file that fails to decode is logged and left out; the batch continues.
#[instrument(skip_all, fields(effect = %ticket.effect.display(), id = ticket.id))]
pub async fn load_frames(
    ticket: LoadTicket,
    files: Vec<PathBuf>,
    canvas: CanvasSize,
    events: Sender<LoaderEvent>,
    cancel: CancellationToken,
) {
    let total = files.len();
    let mut frames = Vec::with_capacity(total);
    let mut failures = 0;

    for (i, file) in files.into_iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(loaded = i, total, "load cancelled");
            return;
        }

        let decoded = tokio::task::spawn_blocking({
            let file = file.clone();
            move || decode_frame(&file, canvas)
        })
        .await;
        let failed = match decoded {
            Ok(Ok(frame)) => {
                frames.push(frame);
                false
            }
            Ok(Err(err)) => {
                warn!(path = %file.display(), "failed to load frame: {err:#}");
                true
            }
            Err(err) => {
                warn!(path = %file.display(), "frame decode task failed: {err}");
                true
            }
        };
        if failed {
            failures += 1;
        }

        let progress = LoaderEvent::Progress {
            ticket: ticket.clone(),
            loaded: i + 1,
            total,
            failed,
        };
        if events.send(progress).await.is_err() {
            debug!("loader receiver closed");
            return;
        }
        tokio::task::yield_now().await;
    }

    if cancel.is_cancelled() {
        return;
    }
    debug!(frames = frames.len(), failures, "load complete");
    let _ = events
        .send(LoaderEvent::Complete {
            ticket,
            frames,
            failures,
        })
        .await;
}
