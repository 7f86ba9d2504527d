use std::collections::HashMap;

use tokio::sync::oneshot;

use super::LeaseInfo;
use super::LeaseKey;
use super::LeaseRequest;
use crate::Error;
use crate::Result;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests delivered to the coordinator loop. Each carries the sender the
/// loop answers on exactly once.
#[derive(Debug)]
pub(crate) enum LeaseEvent {
    Claim {
        key: LeaseKey,
        request: LeaseRequest,
        reply: Reply<()>,
    },
    Extend {
        key: LeaseKey,
        request: LeaseRequest,
        reply: Reply<()>,
    },
    Check {
        key: LeaseKey,
        reply: Reply<Option<LeaseInfo>>,
    },
    Leases {
        namespace: String,
        reply: Reply<HashMap<String, LeaseInfo>>,
    },
    WaitUntilExpired {
        key: LeaseKey,
        reply: Reply<()>,
    },
}

impl LeaseEvent {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            LeaseEvent::Claim { .. } => "claim",
            LeaseEvent::Extend { .. } => "extend",
            LeaseEvent::Check { .. } => "check",
            LeaseEvent::Leases { .. } => "leases",
            LeaseEvent::WaitUntilExpired { .. } => "wait_until_expired",
        }
    }

    /// Answer with `error` without processing; used when draining the queue
    /// of a dead manager.
    pub(crate) fn reject(
        self,
        error: Error,
    ) {
        // The caller may have given up; nothing to do then.
        match self {
            LeaseEvent::Claim { reply, .. }
            | LeaseEvent::Extend { reply, .. }
            | LeaseEvent::WaitUntilExpired { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            LeaseEvent::Check { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            LeaseEvent::Leases { reply, .. } => {
                let _ = reply.send(Err(error));
            }
        }
    }
}
