// src/session/mod.rs
//! The browsing-session boundary.
//!
//! The harvest pipeline only ever talks to a [`Session`]: one long-lived
//! browsing context shared by every identifier in a run. Element handles
//! handed out by a session are scoped to the page they were queried on and
//! must be given back through [`Session::release`].
#![allow(async_fn_in_trait)]

pub mod http;

use crate::utils::error::SessionError;
use std::path::Path;

/// Opaque reference to an element on the session's current page.
///
/// Not `Clone`: a handle is released exactly once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A download that has started and can be persisted.
pub trait Download {
    /// Filename proposed by the remote side.
    fn suggested_filename(&self) -> &str;

    /// Persist the downloaded content at `path`.
    async fn save_as(self, path: &Path) -> Result<(), SessionError>;
}

pub trait Session {
    type Download: Download;

    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Resolves once `selector` is present on the current page.
    async fn wait_for(&mut self, selector: &str) -> Result<(), SessionError>;

    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), SessionError>;

    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<(), SessionError>;

    async fn click_handle(&mut self, handle: &ElementHandle) -> Result<(), SessionError>;

    async fn query_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>, SessionError>;

    async fn query_within(
        &mut self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, SessionError>;

    async fn text_content(&mut self, handle: &ElementHandle) -> Result<String, SessionError>;

    async fn release(&mut self, handle: ElementHandle);

    /// Start listening for a download before triggering it.
    fn arm_download(&mut self);

    /// Wait for the download armed by [`Session::arm_download`].
    async fn await_download(&mut self) -> Result<Self::Download, SessionError>;
}

/// Release every handle in `handles`.
pub async fn release_all<S: Session>(session: &mut S, handles: Vec<ElementHandle>) {
    for handle in handles {
        session.release(handle).await;
    }
}

/// Query `selector`, read the trimmed text of every match and release the
/// handles again, even when reading one of them fails.
pub async fn texts_of<S: Session>(
    session: &mut S,
    selector: &str,
) -> Result<Vec<String>, SessionError> {
    let handles = session.query_all(selector).await?;
    let mut texts = Vec::with_capacity(handles.len());
    let mut failure = None;
    for handle in &handles {
        match session.text_content(handle).await {
            Ok(text) => texts.push(text.trim().to_string()),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    release_all(session, handles).await;
    match failure {
        Some(e) => Err(e),
        None => Ok(texts),
    }
}
