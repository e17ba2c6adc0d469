//! The current file selection and its preview.

use std::rc::Rc;

use crate::media::{MediaFile, PreviewError, PreviewRef, PreviewResourceManager, ResourcePool};

/// The accepted file, its preview handle, and a generation counter.
///
/// A preview handle is held exactly when a file is held. The generation
/// increments on every replacement or clear so results requested for an
/// earlier selection can be recognised as stale.
#[derive(Debug)]
pub struct Selection {
    file: Option<MediaFile>,
    preview: PreviewResourceManager,
    generation: u64,
}

impl Selection {
    pub fn new(pool: Rc<dyn ResourcePool>, initial_preview: Option<String>) -> Self {
        Self {
            file: None,
            preview: PreviewResourceManager::new(pool, initial_preview),
            generation: 0,
        }
    }

    /// Replace the selection with an accepted file.
    ///
    /// If the preview cannot be created the selection ends up empty.
    pub fn replace(&mut self, file: MediaFile) -> Result<u64, PreviewError> {
        self.generation += 1;
        match self.preview.set(Some(&file)) {
            Ok(_) => {
                log::info!("📷 Selected {} (generation {})", file.name(), self.generation);
                self.file = Some(file);
                Ok(self.generation)
            }
            Err(e) => {
                self.file = None;
                Err(e)
            }
        }
    }

    /// Drop the file and release its preview.
    pub fn clear(&mut self) -> u64 {
        self.generation += 1;
        self.file = None;
        self.preview.clear();
        self.generation
    }

    /// Swap the externally supplied initial preview, clearing the selection.
    pub fn reset_initial_preview(&mut self, initial_preview: Option<String>) -> u64 {
        self.generation += 1;
        self.file = None;
        self.preview.reset_initial(initial_preview);
        self.generation
    }

    pub fn file(&self) -> Option<&MediaFile> {
        self.file.as_ref()
    }

    pub fn preview(&self) -> Option<PreviewRef<'_>> {
        self.preview.current()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `generation` still names this selection.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{CandidateFile, MemoryPool, validate};

    fn image(name: &str) -> MediaFile {
        validate(Some(CandidateFile::new(
            name,
            Some("image/jpeg".into()),
            vec![9; 16],
        )))
        .into_result()
        .unwrap()
    }

    #[test]
    fn test_preview_tracks_file() {
        let pool = Rc::new(MemoryPool::new());
        let mut selection = Selection::new(pool.clone(), None);
        assert!(selection.file().is_none());
        assert!(selection.preview().is_none());

        let generation = selection.replace(image("a.jpg")).unwrap();
        assert_eq!(generation, 1);
        assert!(matches!(selection.preview(), Some(PreviewRef::Owned(_))));
        assert_eq!(pool.live_count(), 1);

        selection.replace(image("b.jpg")).unwrap();
        assert_eq!(selection.file().map(MediaFile::name), Some("b.jpg"));
        assert_eq!(pool.live_count(), 1);

        selection.clear();
        assert!(selection.file().is_none());
        assert!(selection.preview().is_none());
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn test_generation_marks_stale() {
        let pool = Rc::new(MemoryPool::new());
        let mut selection = Selection::new(pool, Some("https://cdn.example.org/hero.jpg".into()));

        let first = selection.replace(image("a.jpg")).unwrap();
        assert!(selection.is_current(first));

        selection.clear();
        assert!(!selection.is_current(first));
        assert_eq!(
            selection.preview(),
            Some(PreviewRef::External("https://cdn.example.org/hero.jpg"))
        );
    }

    #[test]
    fn test_reset_initial_preview() {
        let pool = Rc::new(MemoryPool::new());
        let mut selection = Selection::new(pool.clone(), None);
        selection.replace(image("a.jpg")).unwrap();

        selection.reset_initial_preview(Some("https://cdn.example.org/new.jpg".into()));
        assert!(selection.file().is_none());
        assert_eq!(pool.live_count(), 0);
        assert_eq!(
            selection.preview().map(|p| p.url()),
            Some("https://cdn.example.org/new.jpg")
        );
    }
}
