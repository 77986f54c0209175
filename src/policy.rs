//! Component D: policy-engine client.
//!
//! This layer never asks the engine "may I proceed?" and waits — spec.md §4.D is explicit that
//! the contract is submission-only: the dispatch front end builds an [`EnforcementContext`]
//! describing the operation it is about to perform, hands it to a [`PolicyEngineClient`], and
//! proceeds with the native call regardless of whether the submission was accepted. Rate
//! shaping happens out-of-band, in whatever consumes the submitted stream; a slow or unreachable
//! engine therefore must never stall the caller.

use zerocopy::{Immutable, IntoBytes};

use crate::error::CoreError;
use crate::ops::Operation;
use crate::table::mount_point::MountPoint;
use crate::table::pool::Workflow;

/// The FFI-shaped record submitted to the policy engine for one dispatch.
///
/// `#[repr(C)]` and zerocopy-derived so it can be written as raw bytes to a socket or shared-
/// memory ring without a serialization pass — mirroring how `original_source`'s
/// `data_plane_stage.hpp` hands a POD struct across the engine boundary.
#[derive(Debug, Clone, Copy, IntoBytes, Immutable)]
#[repr(C)]
pub struct EnforcementContext {
    pub bytes: u64,
    pub op_type: i32,
    pub workflow: u32,
    pub mount_point: u8,
    _padding: [u8; 7],
}

impl EnforcementContext {
    pub fn new(op: Operation, mount_point: MountPoint, workflow: Workflow, bytes: u64) -> Self {
        EnforcementContext {
            bytes,
            op_type: op.wire_tag(),
            workflow: workflow.0,
            mount_point: mount_point.into(),
            _padding: [0; 7],
        }
    }
}

/// How the client reaches the policy engine, chosen at startup (spec.md §6; see DESIGN.md for
/// why this is a runtime choice rather than a Cargo feature).
pub enum EngineConstructionParams {
    /// No engine configured: every submission is accepted locally and discarded. Used when the
    /// layer is deployed purely for its statistics registry, or during tests.
    Offline,
    /// A real engine endpoint, identified by the environment-derived connection string (e.g. a
    /// Unix socket path). Connection establishment is deferred to first submission.
    Online { endpoint: String },
}

/// Submission-only interface to the policy engine.
///
/// Implementations must not block the caller for longer than it takes to enqueue the context —
/// no waiting on a reply, no retry loop on the hot path. `submit` returning `Err` only means the
/// context could not be *enqueued* (e.g. the channel to the engine is closed); it never means
/// "denied".
pub trait PolicyEngineClient: Send + Sync {
    fn submit(&self, context: &EnforcementContext) -> Result<(), CoreError>;
}

/// A client that accepts and discards every submission. The default when no engine endpoint is
/// configured.
pub struct OfflineClient;

impl PolicyEngineClient for OfflineClient {
    fn submit(&self, _context: &EnforcementContext) -> Result<(), CoreError> {
        Ok(())
    }
}

/// A client backed by a Unix domain socket, writing each [`EnforcementContext`] as raw bytes.
/// Connection is lazy and best-effort: if the engine isn't listening yet, submissions are
/// silently dropped rather than retried, consistent with the submission-only contract.
pub struct UnixSocketClient {
    socket: parking_lot::Mutex<Option<std::os::unix::net::UnixDatagram>>,
    endpoint: String,
}

impl UnixSocketClient {
    pub fn new(endpoint: String) -> Self {
        UnixSocketClient {
            socket: parking_lot::Mutex::new(None),
            endpoint,
        }
    }

    fn ensure_connected<'a>(
        &'a self,
        guard: &mut parking_lot::MutexGuard<'a, Option<std::os::unix::net::UnixDatagram>>,
    ) {
        if guard.is_none() {
            if let Ok(sock) = std::os::unix::net::UnixDatagram::unbound() {
                if sock.connect(&self.endpoint).is_ok() {
                    **guard = Some(sock);
                }
            }
        }
    }
}

impl PolicyEngineClient for UnixSocketClient {
    fn submit(&self, context: &EnforcementContext) -> Result<(), CoreError> {
        let mut guard = self.socket.lock();
        self.ensure_connected(&mut guard);
        match guard.as_ref() {
            Some(sock) => sock
                .send(zerocopy::IntoBytes::as_bytes(context))
                .map(|_| ())
                .map_err(|e| CoreError::EngineSubmissionFailure {
                    op: "submit",
                    reason: e.to_string(),
                }),
            None => Err(CoreError::EngineSubmissionFailure {
                op: "submit",
                reason: format!("engine endpoint `{}` unreachable", self.endpoint),
            }),
        }
    }
}

pub fn build_client(params: EngineConstructionParams) -> Box<dyn PolicyEngineClient> {
    match params {
        EngineConstructionParams::Offline => Box::new(OfflineClient),
        EngineConstructionParams::Online { endpoint } => Box::new(UnixSocketClient::new(endpoint)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Data;

    #[test]
    fn enforcement_context_carries_workflow_and_bytes() {
        let ctx = EnforcementContext::new(
            Operation::Data(Data::Read),
            MountPoint::Remote,
            Workflow(3),
            4096,
        );
        assert_eq!(ctx.workflow, 3);
        assert_eq!(ctx.bytes, 4096);
        assert_eq!(ctx.mount_point, 2);
    }

    #[test]
    fn offline_client_always_accepts() {
        let client = build_client(EngineConstructionParams::Offline);
        let ctx = EnforcementContext::new(
            Operation::Data(Data::Write),
            MountPoint::Local,
            Workflow(0),
            0,
        );
        assert!(client.submit(&ctx).is_ok());
    }

    #[test]
    fn context_is_plain_bytes() {
        let ctx = EnforcementContext::new(
            Operation::Special(crate::ops::Special::Fcntl),
            MountPoint::None,
            Workflow::INVALID,
            0,
        );
        let bytes = zerocopy::IntoBytes::as_bytes(&ctx);
        assert_eq!(bytes.len(), std::mem::size_of::<EnforcementContext>());
    }
}
