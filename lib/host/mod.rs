//! Host-side binding: callback registration, session lifecycle, dispatch.
//!
//! [`HostBinding`] owns the native session handle and exposes the bridge's
//! methods as a uniform callback surface. Taxonomy errors are converted
//! into host-native error identifiers exactly once, on the way out of
//! [`HostBinding::dispatch`].

#[cfg(target_os = "linux")]
pub mod fuse;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::bridge::{BridgeAdapter, PlaceholderInfo};
use crate::error::FsError;
use crate::fs::{DirEntryInfo, StoreFs};
use crate::stats::Statistics;

/// A request arriving from the host virtualization driver.
///
/// Paths are host-relative, exactly as the driver supplies them; the
/// bridge canonicalizes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    PlaceholderInfo {
        path: String,
    },
    FileData {
        path: String,
        offset: u64,
        length: u64,
    },
    DirectoryEnumeration {
        path: String,
        pattern: Option<String>,
    },
    HandleClosedModified {
        path: String,
        is_directory: bool,
        is_deleted: bool,
    },
    Renamed {
        path: String,
        destination: String,
        is_directory: bool,
    },
    NewFileCreated {
        path: String,
        is_directory: bool,
    },
    PreDelete {
        path: String,
        is_directory: bool,
    },
}

/// Reply returned to the driver for a successfully served request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostReply {
    Placeholder(PlaceholderInfo),
    FileData(Bytes),
    Enumeration(Vec<DirEntryInfo>),
    Acknowledged,
}

/// The registered virtualization session. Exactly one exists per running
/// binding; it is released exactly once, on [`HostBinding::stop`] or when
/// the binding is dropped.
#[derive(Debug)]
struct SessionHandle {
    root: PathBuf,
    started_at: Instant,
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        debug!(root = %self.root.display(), "virtualization session released");
    }
}

/// Registers the bridge as the OS driver's callback table and owns the
/// session lifecycle.
pub struct HostBinding<S: StoreFs> {
    bridge: Arc<BridgeAdapter<S>>,
    session: Option<SessionHandle>,
}

impl<S: StoreFs> HostBinding<S> {
    #[must_use]
    pub fn new(bridge: Arc<BridgeAdapter<S>>) -> Self {
        Self {
            bridge,
            session: None,
        }
    }

    #[must_use]
    pub fn bridge(&self) -> &Arc<BridgeAdapter<S>> {
        &self.bridge
    }

    /// Register the callback table and begin serving.
    ///
    /// Runs the warm-start pre-population (when enabled) before the
    /// session is considered live, so the host's first on-demand requests
    /// land on a populated cache.
    #[instrument(name = "HostBinding::start", skip(self))]
    pub async fn start(&mut self) -> Result<(), FsError> {
        if self.session.is_some() {
            return Err(FsError::AlreadyExists(
                "virtualization session already running".to_owned(),
            ));
        }

        let root = self.bridge.virtualization_root().to_path_buf();
        if self.bridge.warm_start_enabled() {
            self.bridge.warm_start().await;
        }

        self.session = Some(SessionHandle {
            root: root.clone(),
            started_at: Instant::now(),
        });
        info!(root = %root.display(), "virtualization session started");
        Ok(())
    }

    /// Detach from the driver, releasing the session handle.
    pub fn stop(&mut self) {
        match self.session.take() {
            Some(session) => {
                info!(root = %session.root.display(), "virtualization session stopped");
            }
            None => warn!("stop called on a binding that is not running"),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn uptime(&self) -> Option<Duration> {
        self.session.as_ref().map(|s| s.started_at.elapsed())
    }

    /// Serve one host callback.
    ///
    /// Failures leave as host-native error identifiers (errnos). No
    /// partial result is ever returned together with an error.
    #[instrument(name = "HostBinding::dispatch", skip(self, request))]
    pub async fn dispatch(&self, request: HostRequest) -> Result<HostReply, i32> {
        let result = match request {
            HostRequest::PlaceholderInfo { path } => self
                .bridge
                .get_placeholder_info(&path)
                .await
                .map(HostReply::Placeholder),
            HostRequest::FileData {
                path,
                offset,
                length,
            } => self
                .bridge
                .get_file_data(&path, offset, length)
                .await
                .map(HostReply::FileData),
            HostRequest::DirectoryEnumeration { path, pattern } => self
                .bridge
                .get_directory_enumeration(&path, pattern.as_deref())
                .await
                .map(HostReply::Enumeration),
            HostRequest::HandleClosedModified {
                path,
                is_directory,
                is_deleted,
            } => self
                .bridge
                .notify_file_handle_closed_modified(&path, is_directory, is_deleted)
                .await
                .map(|()| HostReply::Acknowledged),
            HostRequest::Renamed {
                path,
                destination,
                is_directory,
            } => self
                .bridge
                .notify_renamed(&path, &destination, is_directory)
                .await
                .map(|()| HostReply::Acknowledged),
            HostRequest::NewFileCreated { path, is_directory } => self
                .bridge
                .notify_new_file_created(&path, is_directory)
                .await
                .map(|()| HostReply::Acknowledged),
            HostRequest::PreDelete { path, is_directory } => self
                .bridge
                .notify_pre_delete(&path, is_directory)
                .await
                .map(|()| HostReply::Acknowledged),
        };

        result.map_err(|e| {
            if e.is_passthrough() {
                warn!(error = %e, "replying unrecognized error to host");
            } else {
                debug!(error = %e, "replying error to host");
            }
            e.errno()
        })
    }

    /// Point-in-time statistics snapshot.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.bridge.stats_snapshot(self.uptime())
    }
}
