use std::{io, sync::Arc};

use comms::{Envelope, FrameTooLarge, OnoReceiver, OnoSender, Response};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{Result, WorkerErr, resources::Resources, router::Router};

/// The first message a connection receives.
pub const INIT_MESSAGE: &str = "Worker initialized";

/// Serves one connection until the peer closes it.
///
/// Every response goes through a single writer task, so frames never interleave no
/// matter how many runs are in flight. A malformed frame is answered and skipped, an
/// oversized one is answered and closes the connection. When the connection ends every
/// run it started is cancelled.
///
/// # Arguments
/// * `rx` - The receiving end of the connection.
/// * `tx` - The sending end of the connection.
/// * `resources` - What the connection shares with the rest of the process.
pub async fn serve<R, W>(
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
    resources: Arc<Resources>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out, mut outbox) = mpsc::unbounded_channel::<Envelope>();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbox.recv().await {
            tx.send(&envelope).await?;
        }

        Ok::<_, io::Error>(())
    });

    let router = Router::new(resources, out);
    router.reply(
        None,
        Response::Init {
            message: INIT_MESSAGE.to_string(),
        },
    );

    let ret = loop {
        match rx.recv::<Envelope>().await {
            Ok(envelope) => router.dispatch(envelope),
            Err(e) if FrameTooLarge::is(&e) => {
                warn!("closing the connection: {e}");
                router.reply(
                    None,
                    Response::Error {
                        message: e.to_string(),
                        kind: machine_learning::ErrorKind::Configuration.to_string(),
                    },
                );
                break Err(WorkerErr::Io(e));
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("malformed message: {e}");
                router.reply(
                    None,
                    Response::Error {
                        message: format!("malformed message: {e}"),
                        kind: machine_learning::ErrorKind::Configuration.to_string(),
                    },
                );
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("peer disconnected");
                break Ok(());
            }
            Err(e) => break Err(WorkerErr::Io(e)),
        }
    };

    router.shutdown();
    drop(router);

    // runs still in flight hold their own outbox handles, the writer stops once they end
    match writer.await? {
        Ok(()) => debug!("writer finished"),
        Err(e) => debug!("writer stopped: {e}"),
    }

    ret
}
