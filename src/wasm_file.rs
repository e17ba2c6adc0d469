//! Browser file access.
//!
//! Opens the single-image file picker and reads picked or dropped files into
//! [`CandidateFile`]s carrying the browser's declared media type.

use std::cell::RefCell;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Event, HtmlInputElement};

use crate::media::CandidateFile;

thread_local! {
    /// Result of the last picker interaction; the page polls this via `take_picked_file()`
    static PICKED_FILE: RefCell<Option<Option<CandidateFile>>> = const { RefCell::new(None) };
}

/// Take the file chosen in the picker, if the picker finished since the last call.
///
/// The inner `None` means the picker closed without a file.
pub fn take_picked_file() -> Option<Option<CandidateFile>> {
    PICKED_FILE.with(|picked| picked.borrow_mut().take())
}

fn set_picked_file(file: Option<CandidateFile>) {
    PICKED_FILE.with(|picked| {
        *picked.borrow_mut() = Some(file);
    });
}

/// Read a browser `File` into a candidate.
pub async fn read_candidate(file: &web_sys::File) -> Result<CandidateFile, JsValue> {
    let buffer = JsFuture::from(file.array_buffer()).await?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    log::info!("📂 File {} read: {} bytes", file.name(), bytes.len());

    Ok(CandidateFile::new(file.name(), Some(file.type_()), bytes))
}

/// Open the file picker for one image.
pub fn open_image_picker() -> Result<(), JsValue> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document available"))?;

    let input: HtmlInputElement = document.create_element("input")?.dyn_into()?;
    input.set_type("file");
    input.set_accept("image/*");

    let onchange = Closure::wrap(Box::new(move |event: Event| {
        let file = event
            .target()
            .and_then(|target| target.dyn_into::<HtmlInputElement>().ok())
            .and_then(|input| input.files())
            .and_then(|files| files.get(0));

        let Some(file) = file else {
            log::warn!("📂 No file selected");
            set_picked_file(None);
            return;
        };

        wasm_bindgen_futures::spawn_local(async move {
            match read_candidate(&file).await {
                Ok(candidate) => set_picked_file(Some(candidate)),
                Err(e) => {
                    log::error!("Failed to read {}: {:?}", file.name(), e);
                    set_picked_file(None);
                }
            }
        });
    }) as Box<dyn FnMut(Event)>);

    input.set_onchange(Some(onchange.as_ref().unchecked_ref()));
    onchange.forget(); // Leak the closure to keep it alive

    input.click();
    Ok(())
}
