//! Inbound message pipeline of one peer.
//!
//! Each channel gets a reader task. Readers feed one shared queue sized
//! `channel_size_per_peer * channels`, drained by worker tasks that hand
//! messages to a [`MsgHandler`]. The first error from any reader or worker
//! tears the whole pipeline down and is returned as the session's end.

use {
    crate::{
        config::P2pConfig,
        error::{P2pError, Result},
        msg::Msg,
        peer::Peer,
        transport::MsgReader,
    },
    async_trait::async_trait,
    log::*,
    std::sync::Arc,
    tokio::{
        sync::{mpsc, Mutex as AsyncMutex},
        task::JoinSet,
    },
};

#[async_trait]
pub trait MsgHandler: Send + Sync + 'static {
    /// Handle one inbound message. An error ends the session.
    async fn handle(&self, peer: &Arc<dyn Peer>, msg: Msg) -> Result<()>;
}

/// Read and dispatch messages from `peer` until a reader or the handler
/// fails, or the peer is closed. Returns the error that ended the session.
///
/// A single reader is drained by one worker so its messages are handled in
/// arrival order; several readers get `workers_per_peer` workers.
pub async fn serve<H: MsgHandler>(
    peer: Arc<dyn Peer>,
    readers: Vec<Box<dyn MsgReader>>,
    handler: Arc<H>,
    config: &P2pConfig,
) -> P2pError {
    let channels = readers.len().max(1);
    let workers = if channels > 1 {
        config.workers_per_peer.max(1)
    } else {
        1
    };
    let (inbound_sender, inbound) =
        mpsc::channel::<Msg>(config.channel_size_per_peer.max(1).saturating_mul(channels));
    let (err_sender, mut errors) = mpsc::channel::<P2pError>(channels.saturating_add(workers));
    let closed = peer.base().closed().child_token();
    let mut tasks = JoinSet::new();

    for (channel, mut reader) in readers.into_iter().enumerate() {
        let inbound_sender = inbound_sender.clone();
        let err_sender = err_sender.clone();
        let closed = closed.clone();
        let id = peer.base().id().to_string();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    result = reader.read_msg() => match result {
                        Ok(msg) => {
                            if inbound_sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            debug!("peer {id}: channel {channel} read failed: {err}");
                            let _ = err_sender.try_send(err);
                            break;
                        }
                    },
                }
            }
        });
    }
    drop(inbound_sender);

    let inbound = Arc::new(AsyncMutex::new(inbound));
    for _ in 0..workers {
        let inbound = inbound.clone();
        let err_sender = err_sender.clone();
        let closed = closed.clone();
        let peer = peer.clone();
        let handler = handler.clone();
        tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = closed.cancelled() => break,
                    next = async { inbound.lock().await.recv().await } => next,
                };
                let Some(msg) = next else {
                    break;
                };
                if let Err(err) = handler.handle(&peer, msg).await {
                    let _ = err_sender.try_send(err);
                    break;
                }
            }
        });
    }
    drop(err_sender);

    let err = tokio::select! {
        err = errors.recv() => err.unwrap_or(P2pError::Closed),
        _ = closed.cancelled() => P2pError::Closed,
    };
    closed.cancel();
    tasks.shutdown().await;
    debug!("peer {}: session ended: {err}", peer.base().id());
    err
}
