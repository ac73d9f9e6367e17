// ============================================================================
// FIELD LOADER — decode + sample photos off the frame loop
// ============================================================================
//
// Each request gets a fresh id and runs on the rayon pool.  Results come back
// over an mpsc channel that the frame loop drains with `poll()`.  Only the
// result of the most recent request is ever handed out: anything older is
// dropped, even if it finishes last.
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use crate::error::LoadError;
use crate::field::ParticleField;
use crate::sampler::{self, SamplerSettings};

/// Identity of one load request.  Later requests compare greater.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// Where the photo comes from.
#[derive(Clone, Debug)]
pub enum PhotoSource {
    Path(PathBuf),
    Bytes { name: String, data: Arc<[u8]> },
}

impl PhotoSource {
    /// Short human-readable name for status lines and logs.
    pub fn label(&self) -> String {
        match self {
            PhotoSource::Path(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string()),
            PhotoSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// A finished request, successful or not.
#[derive(Debug)]
pub enum LoadOutcome {
    Ready {
        id: RequestId,
        source: PhotoSource,
        field: ParticleField,
    },
    Failed {
        id: RequestId,
        source: PhotoSource,
        error: LoadError,
    },
}

impl LoadOutcome {
    pub fn id(&self) -> RequestId {
        match self {
            LoadOutcome::Ready { id, .. } | LoadOutcome::Failed { id, .. } => *id,
        }
    }
}

/// Decode and sample synchronously.  The background path runs exactly this.
pub fn load_field(
    source: &PhotoSource,
    settings: &SamplerSettings,
    seed: u64,
) -> Result<ParticleField, LoadError> {
    let img = match source {
        PhotoSource::Path(path) => sampler::decode_path(path)?,
        PhotoSource::Bytes { data, .. } => sampler::decode_bytes(data)?,
    };
    let mut rng = fastrand::Rng::with_seed(seed);
    sampler::sample_image(&img, settings, &mut rng)
}

/// Background loader with last-writer-wins semantics.
pub struct FieldLoader {
    sender: mpsc::Sender<LoadOutcome>,
    receiver: mpsc::Receiver<LoadOutcome>,
    next_id: u64,
    latest: Option<RequestId>,
}

impl Default for FieldLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            next_id: 0,
            latest: None,
        }
    }

    /// The request whose result will be accepted, if one is outstanding.
    pub fn pending(&self) -> Option<RequestId> {
        self.latest
    }

    /// Start loading `source`.  Supersedes any request still in flight.
    pub fn request(&mut self, source: PhotoSource, settings: SamplerSettings, seed: u64) -> RequestId {
        let id = self.issue();
        log::info!("load #{} requested: {}", id.0, source.label());
        let sender = self.sender.clone();
        rayon::spawn(move || {
            let outcome = match load_field(&source, &settings, seed) {
                Ok(field) => LoadOutcome::Ready { id, source, field },
                Err(error) => LoadOutcome::Failed { id, source, error },
            };
            // Receiver gone means the session ended; nothing to report to.
            let _ = sender.send(outcome);
        });
        id
    }

    fn issue(&mut self) -> RequestId {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.latest = Some(id);
        id
    }

    /// Non-blocking: newest accepted outcome, if the latest request finished.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let mut accepted = None;
        while let Ok(outcome) = self.receiver.try_recv() {
            if let Some(o) = self.accept(outcome) {
                accepted = Some(o);
            }
        }
        accepted
    }

    /// Block until the latest request finishes or `timeout` passes.
    pub fn wait(&mut self, timeout: std::time::Duration) -> Option<LoadOutcome> {
        let deadline = std::time::Instant::now() + timeout;
        while self.latest.is_some() {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            if left.is_zero() {
                return None;
            }
            match self.receiver.recv_timeout(left) {
                Ok(outcome) => {
                    if let Some(o) = self.accept(outcome) {
                        return Some(o);
                    }
                }
                Err(_) => return None,
            }
        }
        None
    }

    /// Keep `outcome` only if it answers the latest request.
    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        if Some(outcome.id()) != self.latest {
            log::debug!("dropping stale load #{}", outcome.id().0);
            return None;
        }
        self.latest = None;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::ParticleInstance;

    fn tiny_field() -> ParticleField {
        ParticleField::from_grid(vec![ParticleInstance::CULLED; 2], 2, 1).unwrap()
    }

    fn png_bytes(w: u32, h: u32) -> Arc<[u8]> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([200, 100, 50, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageOutputFormat::Png).unwrap();
        out.into_inner().into()
    }

    #[test]
    fn stale_result_is_dropped_even_if_it_arrives_last() {
        let mut loader = FieldLoader::new();
        let first = loader.issue();
        let second = loader.issue();
        let src = PhotoSource::Path(PathBuf::from("x.png"));

        // Newer request finishes first...
        let newer = loader.accept(LoadOutcome::Ready { id: second, source: src.clone(), field: tiny_field() });
        assert_eq!(newer.map(|o| o.id()), Some(second));
        // ...and the older one straggling in afterwards is ignored.
        let older = loader.accept(LoadOutcome::Ready { id: first, source: src, field: tiny_field() });
        assert!(older.is_none());
        assert_eq!(loader.pending(), None);
    }

    #[test]
    fn older_result_arriving_first_is_dropped() {
        let mut loader = FieldLoader::new();
        let first = loader.issue();
        let second = loader.issue();
        let src = PhotoSource::Path(PathBuf::from("x.png"));

        assert!(loader.accept(LoadOutcome::Ready { id: first, source: src.clone(), field: tiny_field() }).is_none());
        assert_eq!(loader.pending(), Some(second));
        assert!(loader.accept(LoadOutcome::Ready { id: second, source: src, field: tiny_field() }).is_some());
    }

    #[test]
    fn background_load_delivers_latest_only() {
        let mut loader = FieldLoader::new();
        let settings = SamplerSettings {
            grid_width: 10,
            ..SamplerSettings::default()
        };
        loader.request(PhotoSource::Bytes { name: "a".into(), data: png_bytes(4, 4) }, settings, 1);
        let latest = loader.request(PhotoSource::Bytes { name: "b".into(), data: png_bytes(4, 8) }, settings, 1);

        match loader.wait(std::time::Duration::from_secs(10)) {
            Some(LoadOutcome::Ready { id, field, source }) => {
                assert_eq!(id, latest);
                assert_eq!(source.label(), "b");
                assert_eq!(field.grid(), (10, 20));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn failed_decode_is_reported_not_panicked() {
        let mut loader = FieldLoader::new();
        let bad = PhotoSource::Bytes { name: "bad".into(), data: Arc::from(&b"nope"[..]) };
        loader.request(bad, SamplerSettings::default(), 0);
        match loader.wait(std::time::Duration::from_secs(10)) {
            Some(LoadOutcome::Failed { error, .. }) => assert!(matches!(error, LoadError::Decode(_))),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
