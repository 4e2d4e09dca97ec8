//! Acknowledgement related types and functions.
//!
//! Here is the main type:
//!
//! - [`AckFuture`]: a [`Future`] of the message list sent back by the
//!   server to acknowledge an emitted event.

use std::{
    future::Future,
    pin::Pin,
    sync::Weak,
    task::{Context, Poll},
    time::Duration,
};

use tokio::{sync::oneshot::Receiver, time::Timeout};

use crate::{errors::AckError, socket::Socket, value::Value};

/// The outcome of an emit with ack: the server message list or a typed
/// failure
pub type AckResult = Result<Vec<Value>, AckError>;

pin_project_lite::pin_project! {
    /// A [`Future`] of the acknowledgement sent back by the server for an
    /// emitted event, obtained from [`Socket::emit_async`].
    ///
    /// Exactly one of the ack payload or [`AckError::Timeout`] is
    /// produced. Dropping the future before it resolved cancels the
    /// operation: the pending entry is withdrawn and a late server ack is
    /// silently discarded.
    ///
    /// [`Socket::emit_async`]: crate::socket::Socket::emit_async
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct AckFuture {
        #[pin]
        rx: Timeout<Receiver<Vec<Value>>>,
        guard: AckGuard,
    }
}

impl AckFuture {
    pub(crate) fn new(
        rx: Receiver<Vec<Value>>,
        timeout: Duration,
        socket: Weak<Socket>,
        id: i64,
    ) -> Self {
        Self {
            rx: tokio::time::timeout(timeout, rx),
            guard: AckGuard {
                socket,
                id,
                armed: true,
            },
        }
    }
}

impl Future for AckFuture {
    type Output = AckResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(v) => {
                this.guard.armed = false;
                let v = match v {
                    Ok(Ok(data)) => Ok(data),
                    Ok(Err(_)) => Err(AckError::Closed),
                    Err(_) => {
                        // The deadline wins: withdraw the entry so a late
                        // server ack is discarded
                        if let Some(socket) = this.guard.socket.upgrade() {
                            socket.forget_ack(this.guard.id);
                        }
                        Err(AckError::Timeout)
                    }
                };
                Poll::Ready(v)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Withdraws the pending ack entry when the future is dropped before
/// resolution
struct AckGuard {
    socket: Weak<Socket>,
    id: i64,
    armed: bool,
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Some(socket) = self.socket.upgrade() {
                socket.forget_ack(self.id);
            }
        }
    }
}
