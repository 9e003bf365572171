//! JSON-lines bridge between the renderer and the player loop.
//!
//! Notifications go out on stdout, one `Message` per line, starting with
//! `Hello`.  Gestures come in on stdin the same way; end of input shuts the
//! player down.
use player_core::PlayerEvent;
use player_proto::protocol::{Message, Notification};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Forward notifications until the sender side closes.
pub async fn write_notifications<W>(
    mut out: W,
    hello: Notification,
    mut notify_rx: broadcast::Receiver<Notification>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_message(&mut out, Message::Notification(hello)).await?;
    loop {
        match notify_rx.recv().await {
            Ok(notification) => {
                write_message(&mut out, Message::Notification(notification)).await?
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("renderer missed {} notifications", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    out.flush().await?;
    Ok(())
}

async fn write_message<W: AsyncWrite + Unpin>(out: &mut W, msg: Message) -> anyhow::Result<()> {
    let line = msg.encode_line()?;
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Read gestures line by line and feed them to the loop.  Sends `Shutdown`
/// when the input ends.
pub async fn read_gestures<R>(
    input: R,
    event_tx: mpsc::UnboundedSender<PlayerEvent>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match Message::decode_line(&line) {
            Ok(Message::Gesture(gesture)) => {
                debug!("gesture {:?}", gesture);
                if event_tx.send(gesture.into()).is_err() {
                    return Ok(());
                }
            }
            Ok(Message::Notification(n)) => {
                warn!("ignoring notification sent by renderer: {:?}", n);
            }
            Err(e) => warn!("bad input line {:?}: {}", line, e),
        }
    }
    info!("input closed");
    let _ = event_tx.send(PlayerEvent::Shutdown);
    Ok(())
}
