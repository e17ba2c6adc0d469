//! Preview handle ownership.
//!
//! A preview handle is an object URL created from a selected file. Handles
//! come from a [`ResourcePool`] (the browser's object URL table, or an
//! in-memory table natively) and must be released exactly once.
//!
//! Ownership is encoded in types rather than checked at runtime:
//!
//! - A pool hands out [`PoolHandle`]s, which nothing outside this module can
//!   construct or clone, and [`ResourcePool::revoke`] consumes one. A handle
//!   the manager holds, or a URL string from anywhere else, therefore cannot
//!   be revoked by other code.
//! - [`ObjectUrl`] wraps a handle together with its pool. It revokes itself
//!   when dropped, and [`ObjectUrl::release`] consumes it, so a handle cannot
//!   be released twice.
//! - An externally supplied initial preview is a plain string
//!   ([`PreviewRef::External`]) and never reaches the pool.
//!
//! Revoking by string does not type-check:
//!
//! ```compile_fail
//! use mela::media::{MemoryPool, ResourcePool};
//!
//! let pool = MemoryPool::new();
//! pool.revoke("blob:mela/1");
//! ```
//!
//! Neither does forging a handle:
//!
//! ```compile_fail
//! use mela::media::PoolHandle;
//!
//! let forged = PoolHandle { url: "blob:mela/1".to_string() };
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::media::MediaFile;

/// Errors raised by a resource pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    /// The pool refused to create a handle
    #[error("Failed to create preview handle: {0}")]
    Create(String),
}

/// A live entry in a resource pool. Minted only by a pool, consumed on revoke.
#[derive(Debug, PartialEq, Eq)]
pub struct PoolHandle {
    url: String,
}

impl PoolHandle {
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

/// A table of previewable handles.
pub trait ResourcePool {
    /// Create a handle for the file's bytes.
    fn create(&self, file: &MediaFile) -> Result<PoolHandle, PreviewError>;

    /// Release a handle previously returned by `create`.
    fn revoke(&self, handle: PoolHandle);
}

/// An owned pool handle. Released when dropped.
pub struct ObjectUrl {
    handle: Option<PoolHandle>,
    pool: Rc<dyn ResourcePool>,
}

impl ObjectUrl {
    /// Create a handle for `file` in `pool`.
    pub fn create(pool: Rc<dyn ResourcePool>, file: &MediaFile) -> Result<Self, PreviewError> {
        let handle = pool.create(file)?;
        log::debug!("🖼️ Created preview handle {} for {}", handle.as_str(), file.name());
        Ok(Self {
            handle: Some(handle),
            pool,
        })
    }

    pub fn as_str(&self) -> &str {
        self.handle.as_ref().map_or("", PoolHandle::as_str)
    }

    /// Release the handle now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ObjectUrl {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("🗑️ Releasing preview handle {}", handle.as_str());
            self.pool.revoke(handle);
        }
    }
}

impl std::fmt::Debug for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObjectUrl").field(&self.as_str()).finish()
    }
}

/// A borrowed view of the preview currently shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewRef<'a> {
    /// A handle this manager created and will release
    Owned(&'a str),
    /// An initial preview supplied from outside; never released here
    External(&'a str),
}

impl<'a> PreviewRef<'a> {
    pub fn url(&self) -> &'a str {
        match self {
            PreviewRef::Owned(url) | PreviewRef::External(url) => url,
        }
    }
}

/// Keeps at most one live preview handle for a selection.
pub struct PreviewResourceManager {
    pool: Rc<dyn ResourcePool>,
    initial: Option<String>,
    current: Option<ObjectUrl>,
}

impl PreviewResourceManager {
    /// Create a manager, optionally showing an external initial preview.
    pub fn new(pool: Rc<dyn ResourcePool>, initial_preview: Option<String>) -> Self {
        Self {
            pool,
            initial: initial_preview,
            current: None,
        }
    }

    /// Replace the preview with one for `file`, or fall back to the initial
    /// preview when `file` is `None`.
    ///
    /// The previous owned handle is released before a new one is created.
    pub fn set(&mut self, file: Option<&MediaFile>) -> Result<Option<PreviewRef<'_>>, PreviewError> {
        self.clear();

        if let Some(file) = file {
            self.current = Some(ObjectUrl::create(Rc::clone(&self.pool), file)?);
        }

        Ok(self.current())
    }

    /// Release the owned handle, if any. Clearing twice is a no-op.
    pub fn clear(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.release();
        }
    }

    /// Swap the external initial preview. Any owned handle is released.
    pub fn reset_initial(&mut self, initial_preview: Option<String>) {
        self.clear();
        self.initial = initial_preview;
    }

    /// The preview currently shown, owned handle first.
    pub fn current(&self) -> Option<PreviewRef<'_>> {
        match (&self.current, &self.initial) {
            (Some(handle), _) => Some(PreviewRef::Owned(handle.as_str())),
            (None, Some(initial)) => Some(PreviewRef::External(initial)),
            (None, None) => None,
        }
    }

    /// Whether an owned handle is live.
    pub fn holds_handle(&self) -> bool {
        self.current.is_some()
    }
}

impl std::fmt::Debug for PreviewResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewResourceManager")
            .field("initial", &self.initial)
            .field("current", &self.current)
            .finish()
    }
}

#[derive(Debug, Default)]
struct MemoryPoolState {
    next_id: u64,
    live: HashMap<String, usize>,
    created: u64,
    revoked: u64,
}

/// In-process handle table used natively and in tests.
#[derive(Debug, Default)]
pub struct MemoryPool {
    state: RefCell<MemoryPoolState>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Total handles ever created.
    pub fn created_count(&self) -> u64 {
        self.state.borrow().created
    }

    /// Total handles revoked.
    pub fn revoked_count(&self) -> u64 {
        self.state.borrow().revoked
    }

    pub fn is_live(&self, url: &str) -> bool {
        self.state.borrow().live.contains_key(url)
    }
}

impl ResourcePool for MemoryPool {
    fn create(&self, file: &MediaFile) -> Result<PoolHandle, PreviewError> {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.created += 1;
        let url = format!("blob:mela/{}", state.next_id);
        state.live.insert(url.clone(), file.bytes().len());
        Ok(PoolHandle { url })
    }

    fn revoke(&self, handle: PoolHandle) {
        let mut state = self.state.borrow_mut();
        if state.live.remove(&handle.url).is_some() {
            state.revoked += 1;
        } else {
            log::error!("Revoke of a handle from another pool: {}", handle.url);
        }
    }
}

/// The browser's object URL table.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserUrlPool;

#[cfg(target_arch = "wasm32")]
impl ResourcePool for BrowserUrlPool {
    fn create(&self, file: &MediaFile) -> Result<PoolHandle, PreviewError> {
        let array = js_sys::Uint8Array::from(file.bytes());
        let parts = js_sys::Array::of1(&array);
        let options = web_sys::BlobPropertyBag::new();
        options.set_type(file.media_type());

        let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options)
            .map_err(|e| PreviewError::Create(format!("{:?}", e)))?;
        let url = web_sys::Url::create_object_url_with_blob(&blob)
            .map_err(|e| PreviewError::Create(format!("{:?}", e)))?;
        Ok(PoolHandle { url })
    }

    fn revoke(&self, handle: PoolHandle) {
        if let Err(e) = web_sys::Url::revoke_object_url(&handle.url) {
            log::warn!("Failed to revoke object URL {}: {:?}", handle.url, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{CandidateFile, validate};
    use proptest::prelude::*;

    fn image(name: &str) -> MediaFile {
        validate(Some(CandidateFile::new(
            name,
            Some("image/png".into()),
            vec![1, 2, 3],
        )))
        .into_result()
        .unwrap()
    }

    fn manager(initial: Option<&str>) -> (Rc<MemoryPool>, PreviewResourceManager) {
        let pool = Rc::new(MemoryPool::new());
        let manager = PreviewResourceManager::new(pool.clone(), initial.map(str::to_string));
        (pool, manager)
    }

    #[test]
    fn test_set_releases_previous_handle() {
        let (pool, mut manager) = manager(None);

        let first = manager.set(Some(&image("a.png"))).unwrap().unwrap().url().to_string();
        assert!(pool.is_live(&first));

        let second = manager.set(Some(&image("b.png"))).unwrap().unwrap().url().to_string();
        assert_ne!(first, second);
        assert!(!pool.is_live(&first));
        assert!(pool.is_live(&second));
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (pool, mut manager) = manager(None);
        manager.set(Some(&image("a.png"))).unwrap();

        manager.clear();
        manager.clear();
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.revoked_count(), 1);
        assert_eq!(manager.current(), None);
    }

    #[test]
    fn test_external_initial_preview_is_never_released() {
        let (pool, mut manager) = manager(Some("https://cdn.example.org/sample.jpg"));
        assert_eq!(
            manager.current(),
            Some(PreviewRef::External("https://cdn.example.org/sample.jpg"))
        );

        manager.set(Some(&image("a.png"))).unwrap();
        assert!(matches!(manager.current(), Some(PreviewRef::Owned(_))));

        let fallback = manager.set(None).unwrap();
        assert_eq!(
            fallback,
            Some(PreviewRef::External("https://cdn.example.org/sample.jpg"))
        );
        assert_eq!(pool.created_count(), 1);
        assert_eq!(pool.revoked_count(), 1);
    }

    #[test]
    fn test_teardown_releases_current_handle() {
        let (pool, mut manager) = manager(None);
        manager.set(Some(&image("a.png"))).unwrap();
        assert_eq!(pool.live_count(), 1);

        drop(manager);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.revoked_count(), 1);
    }

    #[test]
    fn test_explicit_release_of_standalone_handle() {
        let pool = Rc::new(MemoryPool::new());
        let handle = ObjectUrl::create(pool.clone(), &image("a.png")).unwrap();
        assert!(pool.is_live(handle.as_str()));

        handle.release();
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn test_pool_holder_cannot_release_owned_handle() {
        let (pool, mut manager) = manager(Some("blob:external/1"));
        let owned = manager
            .set(Some(&image("a.png")))
            .unwrap()
            .unwrap()
            .url()
            .to_string();

        // The pool only revokes handles it minted for the caller
        let own = pool.create(&image("b.png")).unwrap();
        pool.revoke(own);
        assert!(pool.is_live(&owned));
        assert_eq!(manager.current(), Some(PreviewRef::Owned(owned.as_str())));

        drop(manager);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.created_count(), 2);
        assert_eq!(pool.revoked_count(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set,
        SetNone,
        Clear,
        ResetInitial,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Set),
            Just(Op::SetNone),
            Just(Op::Clear),
            Just(Op::ResetInitial),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_live_handle(ops in proptest::collection::vec(op(), 0..40)) {
            let (pool, mut manager) = manager(Some("https://cdn.example.org/initial.png"));

            for (i, op) in ops.iter().enumerate() {
                match op {
                    Op::Set => {
                        manager.set(Some(&image(&format!("{}.png", i)))).unwrap();
                    }
                    Op::SetNone => {
                        manager.set(None).unwrap();
                    }
                    Op::Clear => manager.clear(),
                    Op::ResetInitial => manager.reset_initial(None),
                }
                prop_assert!(pool.live_count() <= 1);
                prop_assert_eq!(pool.live_count() == 1, manager.holds_handle());
            }

            drop(manager);
            prop_assert_eq!(pool.live_count(), 0);
            prop_assert_eq!(pool.created_count(), pool.revoked_count());
        }
    }
}
